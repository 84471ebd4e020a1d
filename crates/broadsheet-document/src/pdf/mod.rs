// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: structural inspection of uploaded editions.

pub mod reader;

pub use reader::{PageSize, PdfReader};
