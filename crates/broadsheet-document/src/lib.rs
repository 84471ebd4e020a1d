// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// broadsheet-document: Turning edition PDFs into page images.
//
// Provides PDF inspection (page count and geometry), raster re-encoding, a
// rasterizer that walks an ordered list of interchangeable render backends,
// and scoped scratch directories for intermediate files.

pub mod image;
pub mod pdf;
pub mod render;
pub mod scratch;

// Re-export the primary structs so callers can use `broadsheet_document::Rasterizer` etc.
pub use crate::image::processor::ImageProcessor;
pub use pdf::reader::{PageSize, PdfReader};
pub use render::{PageRasters, RasterPage, Rasterizer, RenderBackend};
pub use scratch::{ScratchDir, sweep_scratch};
