// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub backend for CI and tests where neither PDFium nor poppler is installed.
//
// Renders each page as a plain sheet at the page's nominal size times the
// requested scale. It can also be told to be unavailable, to reject the
// document, or to fail on a given page.

use ::image::{DynamicImage, Rgb, RgbImage};
use broadsheet_core::error::{BroadsheetError, Result};

use super::{OpenError, RenderBackend, RenderRequest, RenderSession};
use crate::pdf::reader::PageSize;

/// Newsprint grey.
const PAPER: Rgb<u8> = Rgb([244, 241, 232]);

/// Backend that renders blank sheets instead of real page content.
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    unavailable: bool,
    reject: bool,
    fail_on_page: Option<u32>,
}

impl StubBackend {
    pub fn available() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Render normally until `page_no`, which fails.
    pub fn failing_on(page_no: u32) -> Self {
        Self {
            fail_on_page: Some(page_no),
            ..Self::default()
        }
    }
}

impl RenderBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn open<'a>(
        &'a self,
        request: RenderRequest<'a>,
    ) -> std::result::Result<Box<dyn RenderSession + 'a>, OpenError> {
        if self.unavailable {
            tracing::warn!("stub render backend marked unavailable");
            return Err(OpenError::Unavailable("stub backend disabled".into()));
        }
        if self.reject {
            return Err(OpenError::Rejected("stub backend refuses every document".into()));
        }
        Ok(Box::new(StubSession {
            page_sizes: request.page_sizes,
            scale: request.scale,
            fail_on_page: self.fail_on_page,
        }))
    }
}

struct StubSession {
    page_sizes: Vec<PageSize>,
    scale: f32,
    fail_on_page: Option<u32>,
}

impl RenderSession for StubSession {
    fn render_page(&mut self, page_no: u32) -> Result<DynamicImage> {
        if self.fail_on_page == Some(page_no) {
            return Err(BroadsheetError::PageRender {
                page: page_no,
                reason: "stub backend configured to fail".into(),
            });
        }

        let size = page_no
            .checked_sub(1)
            .and_then(|index| self.page_sizes.get(index as usize))
            .ok_or_else(|| BroadsheetError::PageRender {
                page: page_no,
                reason: format!("page out of range (document has {})", self.page_sizes.len()),
            })?;

        let (width, height) = size.scaled(self.scale);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, PAPER)))
    }
}
