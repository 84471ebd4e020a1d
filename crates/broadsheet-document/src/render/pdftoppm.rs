// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Poppler render backend: drives the `pdftoppm` executable one page at a time.
//
// The PDF is written once into the scratch directory; each page is rendered to
// a PNG there, decoded, and the PNG removed before the next page starts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use ::image::DynamicImage;
use broadsheet_core::error::{BroadsheetError, Result};
use tracing::{debug, instrument, warn};

use super::{OpenError, RenderBackend, RenderRequest, RenderSession};
use crate::image::processor::ImageProcessor;

/// Renders pages by shelling out to poppler's `pdftoppm`.
pub struct PdftoppmBackend {
    binary: PathBuf,
}

impl PdftoppmBackend {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Check the binary can be launched at all.
    fn probe(&self) -> std::result::Result<(), OpenError> {
        match Command::new(&self.binary).arg("-v").output() {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(OpenError::Unavailable(format!(
                "{} not found",
                self.binary.display()
            ))),
            Err(e) => Err(OpenError::Unavailable(format!(
                "cannot launch {}: {e}",
                self.binary.display()
            ))),
        }
    }
}

impl RenderBackend for PdftoppmBackend {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    #[instrument(skip_all, fields(pages = request.page_count()))]
    fn open<'a>(
        &'a self,
        request: RenderRequest<'a>,
    ) -> std::result::Result<Box<dyn RenderSession + 'a>, OpenError> {
        self.probe()?;

        let input = request.scratch.join("edition.pdf");
        std::fs::write(&input, request.pdf)
            .map_err(|e| OpenError::Unavailable(format!("cannot stage PDF in scratch: {e}")))?;

        debug!(input = %input.display(), "pdftoppm session opened");
        Ok(Box::new(PdftoppmSession {
            binary: &self.binary,
            input,
            scratch: request.scratch,
            dpi: dpi_for_scale(request.scale),
        }))
    }
}

/// Resolution passed to `-r` for the given oversampling factor.
fn dpi_for_scale(scale: f32) -> u32 {
    (72.0 * scale).round().max(1.0) as u32
}

struct PdftoppmSession<'a> {
    binary: &'a Path,
    input: PathBuf,
    scratch: &'a Path,
    dpi: u32,
}

impl RenderSession for PdftoppmSession<'_> {
    fn render_page(&mut self, page_no: u32) -> Result<DynamicImage> {
        let stem = self.scratch.join(format!("page-{page_no:04}"));
        let page_arg = page_no.to_string();

        let output = Command::new(self.binary)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(&page_arg)
            .arg("-l")
            .arg(&page_arg)
            .arg("-singlefile")
            .arg(&self.input)
            .arg(&stem)
            .output()
            .map_err(|e| BroadsheetError::PageRender {
                page: page_no,
                reason: format!("cannot launch pdftoppm: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BroadsheetError::PageRender {
                page: page_no,
                reason: format!("pdftoppm exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let png = stem.with_extension("png");
        let decoded = ImageProcessor::open(&png).map_err(|e| BroadsheetError::PageRender {
            page: page_no,
            reason: e.to_string(),
        });

        if let Err(e) = std::fs::remove_file(&png) {
            warn!(path = %png.display(), error = %e, "could not remove intermediate page image");
        }

        decoded.map(ImageProcessor::into_dynamic)
    }
}
