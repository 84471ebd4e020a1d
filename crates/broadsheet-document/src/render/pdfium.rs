// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDFium render backend (dynamically linked through `pdfium-render`).

use std::path::PathBuf;
use std::sync::OnceLock;

use ::image::DynamicImage;
use broadsheet_core::error::{BroadsheetError, Result};
use pdfium_render::prelude::*;
use tracing::{debug, instrument};

use super::{OpenError, RenderBackend, RenderRequest, RenderSession};
use crate::image::processor::ImageProcessor;

/// PDFium refuses a second binding in one process, so the first successful
/// bind is kept for the life of the process.
static PDFIUM: OnceLock<Pdfium> = OnceLock::new();

/// Renders pages with PDFium.
///
/// The library is bound on first use. It is searched for in the configured
/// directory first, then in the system library paths. Once bound, later
/// backends share the same binding regardless of their `library_dir`.
pub struct PdfiumBackend {
    library_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn pdfium(&self) -> std::result::Result<&'static Pdfium, OpenError> {
        if let Some(pdfium) = PDFIUM.get() {
            return Ok(pdfium);
        }
        match self.bind() {
            // Losing the race to another thread is fine; its binding wins.
            Ok(pdfium) => {
                let _ = PDFIUM.set(pdfium);
            }
            Err(e) => return PDFIUM.get().ok_or(e),
        }
        PDFIUM
            .get()
            .ok_or_else(|| OpenError::Unavailable("libpdfium binding not retained".into()))
    }

    fn bind(&self) -> std::result::Result<Pdfium, OpenError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                    .or_else(|_| Pdfium::bind_to_system_library())
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| OpenError::Unavailable(format!("cannot load libpdfium: {e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

impl RenderBackend for PdfiumBackend {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    #[instrument(skip_all, fields(pages = request.page_count()))]
    fn open<'a>(
        &'a self,
        request: RenderRequest<'a>,
    ) -> std::result::Result<Box<dyn RenderSession + 'a>, OpenError> {
        let pdfium = self.pdfium()?;

        let document = pdfium
            .load_pdf_from_byte_slice(request.pdf, None)
            .map_err(|e| OpenError::Rejected(format!("{e:?}")))?;

        let page_count = u32::from(document.pages().len());
        if page_count != request.page_count() {
            return Err(OpenError::Rejected(format!(
                "PDFium sees {page_count} pages, structure declares {}",
                request.page_count()
            )));
        }

        debug!(page_count, "PDFium session opened");
        Ok(Box::new(PdfiumSession {
            document,
            scale: request.scale,
        }))
    }
}

/// One parsed document, rendered page by page.
struct PdfiumSession<'a> {
    document: PdfDocument<'a>,
    scale: f32,
}

impl RenderSession for PdfiumSession<'_> {
    fn render_page(&mut self, page_no: u32) -> Result<DynamicImage> {
        let fail = |reason: String| BroadsheetError::PageRender {
            page: page_no,
            reason,
        };

        let index = page_no
            .checked_sub(1)
            .and_then(|i| PdfPageIndex::try_from(i).ok())
            .ok_or_else(|| fail("page number out of range".into()))?;

        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| fail(format!("{e:?}")))?;
        let config = PdfRenderConfig::new().scale_page_by_factor(self.scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| fail(format!("{e:?}")))?;

        let width = u32::try_from(bitmap.width()).map_err(|_| fail("negative bitmap width".into()))?;
        let height =
            u32::try_from(bitmap.height()).map_err(|_| fail("negative bitmap height".into()))?;

        ImageProcessor::from_rgba(width, height, bitmap.as_rgba_bytes())
            .map(ImageProcessor::into_dynamic)
            .map_err(|e| fail(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::PdfReader;
    use crate::pdf::reader::tests::blank_pdf;

    #[test]
    fn one_session_renders_every_page() {
        let pdf = blank_pdf(3);
        let scratch = tempfile::TempDir::new().expect("scratch");
        let request = RenderRequest {
            pdf: &pdf,
            scratch: scratch.path(),
            page_sizes: PdfReader::from_bytes(&pdf).expect("pdf").page_sizes(),
            scale: 2.0,
        };

        let backend = PdfiumBackend::new(None);
        let mut session = match backend.open(request) {
            Ok(session) => session,
            // No libpdfium on this machine; nothing to exercise.
            Err(OpenError::Unavailable(_)) => return,
            Err(OpenError::Rejected(reason)) => panic!("blank pdf rejected: {reason}"),
        };

        for page_no in 1..=3 {
            let image = session.render_page(page_no).expect("render");
            // A4 at 2x is roughly 1190x1684.
            assert!((1185..=1195).contains(&image.width()));
            assert!((1679..=1689).contains(&image.height()));
        }
        assert!(matches!(
            session.render_page(0),
            Err(BroadsheetError::PageRender { page: 0, .. })
        ));
    }
}
