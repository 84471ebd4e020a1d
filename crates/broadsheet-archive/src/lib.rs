// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edition assembly and persistence.
//
// Ties the rasterizer and the asset store together into editions, allocates
// script-preserving slugs, derives section and cover images from stored
// geometry, and keeps edition rows in SQLite.

pub mod geometry;
pub mod normalize;
pub mod service;
pub mod slug;
pub mod store;

pub use geometry::CoverPreset;
pub use normalize::{NormalizeReport, NormalizeWarning, normalize_pages};
pub use service::{EditionService, UpdateOutcome, parse_publication_date};
pub use slug::{SlugProbe, generate as generate_slug, generate_unique as generate_unique_slug};
pub use store::EditionStore;
