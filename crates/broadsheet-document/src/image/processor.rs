// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: holds one rendered page in a lossless in-memory raster and
// re-encodes it to the lossy format used for storage.

use ::image::{DynamicImage, RgbaImage};
use broadsheet_core::error::BroadsheetError;
use tracing::{debug, instrument};

/// A single decoded page raster.
///
/// ```ignore
/// let jpeg = ImageProcessor::from_dynamic(rendered)
///     .flatten()
///     .to_jpeg_bytes(82)?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, BroadsheetError> {
        let img = ::image::open(path.as_ref()).map_err(|err| {
            BroadsheetError::Image(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, BroadsheetError> {
        let img = ::image::load_from_memory(data).map_err(|err| {
            BroadsheetError::Image(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Wrap tightly packed RGBA pixels as produced by a render backend.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, BroadsheetError> {
        let buffer = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            BroadsheetError::Image(format!(
                "pixel buffer does not match {width}x{height} RGBA dimensions"
            ))
        })?;
        Ok(Self {
            image: DynamicImage::ImageRgba8(buffer),
        })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Consume the processor and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Composite any transparency onto white.
    ///
    /// JPEG has no alpha channel; dropping it without compositing turns
    /// transparent page backgrounds black.
    pub fn flatten(self) -> Self {
        if !self.image.color().has_alpha() {
            return self;
        }

        let rgba = self.image.to_rgba8();
        let flattened = ::image::ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
            let ::image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
            let alpha = u32::from(a);
            let blend = |channel: u8| -> u8 {
                ((u32::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
            };
            ::image::Rgb([blend(r), blend(g), blend(b)])
        });
        Self {
            image: DynamicImage::ImageRgb8(flattened),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, BroadsheetError> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder =
            ::image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder).map_err(|err| {
            BroadsheetError::Image(format!("JPEG encoding failed: {}", err))
        })?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_buffer_must_match_dimensions() {
        assert!(ImageProcessor::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            ImageProcessor::from_rgba(2, 2, vec![0; 15]),
            Err(BroadsheetError::Image(_))
        ));
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let processor = ImageProcessor::from_rgba(1, 1, vec![0, 0, 0, 0]).expect("buffer");
        let flat = processor.flatten().into_dynamic().to_rgb8();
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn jpeg_output_decodes_with_same_dimensions() {
        let processor =
            ImageProcessor::from_rgba(40, 30, vec![200; 40 * 30 * 4]).expect("buffer");
        let jpeg = processor.flatten().to_jpeg_bytes(80).expect("encode");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = ImageProcessor::from_bytes(&jpeg).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }
}
