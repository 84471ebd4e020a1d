// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: validate an uploaded edition and read its page geometry
// using the `lopdf` crate. No text is extracted.

use broadsheet_core::error::BroadsheetError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument, warn};

/// US Letter in points, used when a page declares no usable /MediaBox.
const FALLBACK_MEDIA_BOX: PageSize = PageSize {
    width_pt: 612.0,
    height_pt: 792.0,
};

/// Guard against cyclic /Parent chains in damaged files.
const MAX_PARENT_DEPTH: usize = 32;

/// Nominal page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// Pixel dimensions when rendered at `scale` times 72 dpi. Never zero.
    pub fn scaled(&self, scale: f32) -> (u32, u32) {
        let w = (self.width_pt * scale).round().max(1.0) as u32;
        let h = (self.height_pt * scale).round().max(1.0) as u32;
        (w, h)
    }
}

/// Reads the structure of an uploaded PDF.
///
/// Wraps `lopdf::Document`. Anything lopdf cannot parse, or a document with no
/// pages, is reported as [`BroadsheetError::InvalidPdf`] so callers can tell
/// bad input apart from a missing renderer.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, BroadsheetError> {
        if data.is_empty() {
            return Err(BroadsheetError::MissingField("pdf"));
        }

        let document = Document::load_mem(data).map_err(|err| {
            BroadsheetError::InvalidPdf(format!("failed to load PDF from memory: {}", err))
        })?;

        let reader = Self { document };
        reader.ensure_has_pages()?;
        Ok(reader)
    }

    fn ensure_has_pages(&self) -> Result<(), BroadsheetError> {
        let pages = self.page_count();
        if pages == 0 {
            return Err(BroadsheetError::InvalidPdf("document has no pages".into()));
        }
        debug!(pages, "PDF loaded");
        Ok(())
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Nominal size of every page, in page order.
    ///
    /// Honors inherited /MediaBox entries and /Rotate of 90 or 270 degrees.
    pub fn page_sizes(&self) -> Vec<PageSize> {
        let pages = self.document.get_pages();
        let mut numbers: Vec<u32> = pages.keys().copied().collect();
        numbers.sort_unstable();

        numbers
            .into_iter()
            .map(|number| {
                let page_id = pages[&number];
                self.page_size(page_id).unwrap_or_else(|| {
                    warn!(page = number, "no usable /MediaBox, assuming US Letter");
                    FALLBACK_MEDIA_BOX
                })
            })
            .collect()
    }

    // -- Helpers --------------------------------------------------------------

    fn page_size(&self, page_id: ObjectId) -> Option<PageSize> {
        let media_box = self.inherited(page_id, b"MediaBox")?;
        let corners = self.resolve(media_box).as_array().ok()?;
        if corners.len() != 4 {
            return None;
        }

        let mut values = [0f32; 4];
        for (slot, corner) in values.iter_mut().zip(corners) {
            *slot = self.resolve(corner).as_float().ok()?;
        }

        let width = (values[2] - values[0]).abs();
        let height = (values[3] - values[1]).abs();
        if width <= 0.0 || height <= 0.0 {
            return None;
        }

        let rotation = self
            .inherited(page_id, b"Rotate")
            .and_then(|obj| self.resolve(obj).as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360);

        if rotation == 90 || rotation == 270 {
            Some(PageSize {
                width_pt: height,
                height_pt: width,
            })
        } else {
            Some(PageSize {
                width_pt: width,
                height_pt: height,
            })
        }
    }

    /// Look up `key` on the page dictionary, walking /Parent for inherited
    /// attributes.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut dict: &Dictionary = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_PARENT_DEPTH {
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
            dict = self.document.get_dictionary(parent).ok()?;
        }
        None
    }

    /// Follow an indirect reference, leaving direct objects untouched.
    fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        match object {
            Object::Reference(id) => self.document.get_object(*id).unwrap_or(object),
            direct => direct,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use printpdf::{Mm, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg};

    /// Build an A4 PDF with `pages` blank pages.
    pub(crate) fn blank_pdf(pages: usize) -> Vec<u8> {
        let mut doc = PdfDocument::new("fixture");
        let pages: Vec<PdfPage> = (0..pages)
            .map(|_| PdfPage::new(Mm(210.0), Mm(297.0), Vec::new()))
            .collect();
        doc.with_pages(pages);
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        doc.save(&PdfSaveOptions::default(), &mut warnings)
    }

    #[test]
    fn counts_pages() {
        let reader = PdfReader::from_bytes(&blank_pdf(3)).expect("valid pdf");
        assert_eq!(reader.page_count(), 3);
    }

    #[test]
    fn reads_a4_media_box() {
        let reader = PdfReader::from_bytes(&blank_pdf(1)).expect("valid pdf");
        let sizes = reader.page_sizes();
        assert_eq!(sizes.len(), 1);
        // A4 is 595 x 842 points.
        assert!((sizes[0].width_pt - 595.0).abs() < 1.5);
        assert!((sizes[0].height_pt - 842.0).abs() < 1.5);
    }

    #[test]
    fn garbage_is_invalid_pdf() {
        let result = PdfReader::from_bytes(b"this is not a pdf");
        assert!(matches!(result, Err(BroadsheetError::InvalidPdf(_))));
    }

    #[test]
    fn empty_input_is_missing_field() {
        let result = PdfReader::from_bytes(b"");
        assert!(matches!(result, Err(BroadsheetError::MissingField("pdf"))));
    }

    #[test]
    fn scaled_size_never_zero() {
        let tiny = PageSize {
            width_pt: 0.1,
            height_pt: 0.1,
        };
        assert_eq!(tiny.scaled(2.0), (1, 1));
        let a4 = PageSize {
            width_pt: 595.0,
            height_pt: 842.0,
        };
        assert_eq!(a4.scaled(2.0), (1190, 1684));
    }
}
