// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization with an ordered chain of render backends.
//
// The PDF is validated with lopdf first, so a corrupt upload is reported as
// input error before any backend is touched. Backends are then tried in the
// configured order: one that cannot be loaded is skipped, and if none can be
// loaded the caller gets `RendererUnavailable`. Pages are produced one at a
// time, in order, and the first page failure ends the sequence.

#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod pdftoppm;
pub mod stub;

use std::path::Path;

use ::image::DynamicImage;
use broadsheet_core::config::{BackendKind, RenderConfig};
use broadsheet_core::error::{BroadsheetError, Result};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::image::processor::ImageProcessor;
use crate::pdf::reader::{PageSize, PdfReader};

/// One rendered page, re-encoded for storage.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 1-based page number.
    pub page_no: u32,
    /// JPEG-encoded page image.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Everything a backend needs to open a render session.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub pdf: &'a [u8],
    /// Per-operation scratch directory for intermediate files.
    pub scratch: &'a Path,
    /// Nominal size of each page, in page order.
    pub page_sizes: Vec<PageSize>,
    /// Oversampling factor relative to 72 dpi.
    pub scale: f32,
}

impl RenderRequest<'_> {
    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }
}

/// Why a backend could not open a session.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The backend itself is missing (library not found, binary not installed).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend loaded but refused the document.
    #[error("document rejected: {0}")]
    Rejected(String),
}

/// A PDF renderer that can be swapped for another.
pub trait RenderBackend: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Prepare to render `request.pdf`.
    fn open<'a>(
        &'a self,
        request: RenderRequest<'a>,
    ) -> std::result::Result<Box<dyn RenderSession + 'a>, OpenError>;
}

/// An open document on one backend. Only one page renders at a time.
pub trait RenderSession {
    /// Render the 1-based `page_no` into a lossless in-memory raster.
    fn render_page(&mut self, page_no: u32) -> Result<DynamicImage>;
}

/// Converts PDF bytes into an ordered sequence of page images.
pub struct Rasterizer {
    backends: Vec<Box<dyn RenderBackend>>,
    scale: f32,
    jpeg_quality: u8,
}

impl Rasterizer {
    pub fn new(backends: Vec<Box<dyn RenderBackend>>, scale: f32, jpeg_quality: u8) -> Self {
        Self {
            backends,
            scale,
            jpeg_quality,
        }
    }

    /// Build the backend chain in the order given by `config.backends`.
    pub fn from_config(config: &RenderConfig) -> Self {
        let backends = config
            .backends
            .iter()
            .filter_map(|kind| build_backend(*kind, config))
            .collect();
        Self::new(backends, config.effective_scale(), config.effective_quality())
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Start rasterizing `pdf`.
    ///
    /// Fails with `InvalidPdf`/`MissingField` for bad input, and with
    /// `RendererUnavailable` when no backend can be loaded.
    #[instrument(skip_all, fields(pdf_len = pdf.len()))]
    pub fn rasterize<'a>(&'a self, pdf: &'a [u8], scratch: &'a Path) -> Result<PageRasters<'a>> {
        let reader = PdfReader::from_bytes(pdf)?;
        let page_sizes = reader.page_sizes();
        let total = page_sizes.len() as u32;

        let request = RenderRequest {
            pdf,
            scratch,
            page_sizes,
            scale: self.scale,
        };

        let mut tried = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            tried.push(backend.name());
            match backend.open(request.clone()) {
                Ok(session) => {
                    info!(backend = backend.name(), pages = total, scale = self.scale, "rasterizing PDF");
                    return Ok(PageRasters {
                        session,
                        backend: backend.name(),
                        next_page: 1,
                        total,
                        jpeg_quality: self.jpeg_quality,
                        finished: false,
                    });
                }
                Err(OpenError::Unavailable(reason)) => {
                    warn!(backend = backend.name(), %reason, "render backend unavailable, trying next");
                }
                Err(OpenError::Rejected(reason)) => {
                    return Err(BroadsheetError::InvalidPdf(format!(
                        "{} rejected the document: {reason}",
                        backend.name()
                    )));
                }
            }
        }

        let tried = if tried.is_empty() {
            "none configured".to_string()
        } else {
            tried.join(", ")
        };
        Err(BroadsheetError::RendererUnavailable(tried))
    }
}

fn build_backend(kind: BackendKind, config: &RenderConfig) -> Option<Box<dyn RenderBackend>> {
    match kind {
        #[cfg(feature = "pdfium")]
        BackendKind::Pdfium => Some(Box::new(pdfium::PdfiumBackend::new(
            config.pdfium_library_dir.clone(),
        ))),
        #[cfg(not(feature = "pdfium"))]
        BackendKind::Pdfium => {
            warn!("pdfium backend configured but not compiled in");
            None
        }
        BackendKind::Pdftoppm => Some(Box::new(pdftoppm::PdftoppmBackend::new(
            config.pdftoppm_binary.clone(),
        ))),
    }
}

/// Ordered, single-pass sequence of rendered pages.
///
/// Yields pages 1..=N. After the first error it yields nothing further, so a
/// caller never sees a partial page list as success.
pub struct PageRasters<'a> {
    session: Box<dyn RenderSession + 'a>,
    backend: &'static str,
    next_page: u32,
    total: u32,
    jpeg_quality: u8,
    finished: bool,
}

impl PageRasters<'_> {
    /// Total pages the sequence will yield on success.
    pub fn page_count(&self) -> u32 {
        self.total
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    fn render_next(&mut self, page_no: u32) -> Result<RasterPage> {
        let raster = self.session.render_page(page_no)?;
        let processor = ImageProcessor::from_dynamic(raster).flatten();
        let (width, height) = (processor.width(), processor.height());
        if width == 0 || height == 0 {
            return Err(BroadsheetError::PageRender {
                page: page_no,
                reason: "backend produced an empty raster".into(),
            });
        }

        let bytes = processor
            .to_jpeg_bytes(self.jpeg_quality)
            .map_err(|err| BroadsheetError::PageRender {
                page: page_no,
                reason: err.to_string(),
            })?;

        debug!(page_no, width, height, bytes = bytes.len(), "page rasterized");
        Ok(RasterPage {
            page_no,
            bytes,
            width,
            height,
        })
    }
}

impl Iterator for PageRasters<'_> {
    type Item = Result<RasterPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.next_page > self.total {
            return None;
        }

        let page_no = self.next_page;
        self.next_page += 1;

        let result = self.render_next(page_no);
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let remaining = (self.total + 1).saturating_sub(self.next_page) as usize;
        (0, Some(remaining))
    }
}
