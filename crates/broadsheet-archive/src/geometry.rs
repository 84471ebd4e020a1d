// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry and derived-image resolution.
//
// Turns stored rectangles into transform parameters and hands them to the
// asset store's URL builder. Nothing here performs I/O. Malformed or
// out-of-range coordinates are clamped into the page, never rejected.

use broadsheet_assets::{AssetStore, CropBox, Format, Gravity, Quality, Resize, TransformParams};
use broadsheet_core::types::{AssetRef, Edition, Page, Rect};

/// Fixed share-image presets applied to an edition's first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverPreset {
    /// Portrait edition cover, 800x1200.
    EditionCover,
    /// Landscape link preview, 1200x630.
    ArticleShare,
}

impl CoverPreset {
    pub fn resize(&self) -> Resize {
        match self {
            Self::EditionCover => Resize::fill(800, 1200, Gravity::North),
            Self::ArticleShare => Resize::fill(1200, 630, Gravity::North),
        }
    }
}

/// Integer crop box for `rect`, clamped into a `page_width` x `page_height`
/// page. Non-finite or negative values count as 0; the box is at least 1x1.
pub fn crop_box(rect: &Rect, page_width: u32, page_height: u32) -> CropBox {
    let page_width = page_width.max(1);
    let page_height = page_height.max(1);

    let x = to_pixel(rect.x).min(page_width - 1);
    let y = to_pixel(rect.y).min(page_height - 1);
    let width = to_pixel(rect.width).clamp(1, page_width - x);
    let height = to_pixel(rect.height).clamp(1, page_height - y);

    CropBox {
        x,
        y,
        width,
        height,
    }
}

fn to_pixel(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let rounded = value.round();
    if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

/// Parameters for a section crop. Output is always `q_auto:good,f_jpg` so
/// shared links open the same way on every client.
pub fn section_params(rect: &Rect, page_width: u32, page_height: u32) -> TransformParams {
    TransformParams::new()
        .crop(crop_box(rect, page_width, page_height))
        .quality(Quality::AutoGood)
        .format(Format::Jpg)
}

/// Derived URL for `rect` on `page`, if the page has an asset id and the
/// rectangle has area.
pub fn section_image_url(store: &dyn AssetStore, page: &Page, rect: &Rect) -> Option<String> {
    if !page.image.has_asset_id() || !rect.has_area() {
        return None;
    }
    let params = section_params(rect, page.width, page.height);
    Some(store.derived_url(&page.image.asset_id, &params))
}

/// Scale-to-width thumbnail of a page image.
pub fn thumbnail_params(width: u32) -> TransformParams {
    TransformParams::new()
        .resize(Resize::to_width(width.max(1)))
        .quality(Quality::Auto)
        .format(Format::Jpg)
}

pub fn thumbnail_ref(store: &dyn AssetStore, image: &AssetRef, width: u32) -> Option<AssetRef> {
    image.has_asset_id().then(|| AssetRef {
        url: store.derived_url(&image.asset_id, &thumbnail_params(width)),
        asset_id: image.asset_id.clone(),
    })
}

/// Share image for `edition`, or `placeholder` when the first page has no
/// asset to derive from.
pub fn cover_url(
    store: &dyn AssetStore,
    edition: &Edition,
    preset: CoverPreset,
    placeholder: &str,
) -> String {
    match edition.first_page() {
        Some(page) if page.image.has_asset_id() => {
            let params = TransformParams::new()
                .resize(preset.resize())
                .quality(Quality::Auto)
                .format(Format::Jpg);
            store.derived_url(&page.image.asset_id, &params)
        }
        _ => placeholder.to_string(),
    }
}
