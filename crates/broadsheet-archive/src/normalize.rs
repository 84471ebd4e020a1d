// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page/section payload normalization.
//
// Editors send page arrays produced by hand-written tooling, so values arrive
// as numbers, numeric strings, or junk. Fields are coerced rather than
// rejected. A page that cannot be displayed (no image, no positive size) is
// dropped, and every drop or coercion is written to the returned report so
// the caller can surface it.

use broadsheet_assets::AssetStore;
use broadsheet_core::types::{AssetRef, Page, Rect, Section, sort_pages};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::geometry;

/// Title given to sections that arrive without one.
pub const UNTITLED: &str = "untitled";

const PAGE_KEYS: &[&str] = &[
    "pageNumber",
    "image",
    "thumbnail",
    "width",
    "height",
    "sortOrder",
    "sections",
];

const SECTION_KEYS: &[&str] = &[
    "id",
    "slug",
    "x",
    "y",
    "width",
    "height",
    "title",
    "body",
    "articleId",
    "imageUrl",
];

/// One thing normalization changed or threw away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizeWarning {
    /// JSON-path-like location, e.g. `pages[2].sections[0].x`.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeReport {
    pub dropped_pages: usize,
    pub warnings: Vec<NormalizeWarning>,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn note(&mut self, path: String, message: impl Into<String>) {
        let message = message.into();
        warn!(%path, %message, "payload normalized");
        self.warnings.push(NormalizeWarning { path, message });
    }
}

/// Normalize a raw `pages` array into sorted pages.
///
/// Section crop URLs and page thumbnails are derived through `store`.
#[instrument(skip_all, fields(pages = raw.len()))]
pub fn normalize_pages(
    raw: &[Value],
    store: &dyn AssetStore,
    thumbnail_width: u32,
) -> (Vec<Page>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let now_ms = Utc::now().timestamp_millis();

    let mut pages: Vec<Page> = raw
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let page = normalize_page(index, value, store, thumbnail_width, now_ms, &mut report);
            if page.is_none() {
                report.dropped_pages += 1;
            }
            page
        })
        .collect();

    sort_pages(&mut pages);
    debug!(kept = pages.len(), dropped = report.dropped_pages, "pages normalized");
    (pages, report)
}

fn normalize_page(
    index: usize,
    value: &Value,
    store: &dyn AssetStore,
    thumbnail_width: u32,
    now_ms: i64,
    report: &mut NormalizeReport,
) -> Option<Page> {
    let path = format!("pages[{index}]");
    let Some(obj) = value.as_object() else {
        report.note(path, "page is not an object, dropped");
        return None;
    };
    ignore_unknown(obj, PAGE_KEYS, &path);

    let default_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
    let page_number = match obj.get("pageNumber") {
        None | Some(Value::Null) => default_number,
        Some(v) => match coerce_u32(v) {
            Some(n) if n > 0 => n,
            _ => {
                report.note(
                    format!("{path}.pageNumber"),
                    format!("unusable page number {v}, using {default_number}"),
                );
                default_number
            }
        },
    };

    let Some(image) = obj.get("image").and_then(asset_ref) else {
        report.note(path, "page has no image reference, dropped");
        return None;
    };

    let width = obj.get("width").and_then(coerce_u32).unwrap_or(0);
    let height = obj.get("height").and_then(coerce_u32).unwrap_or(0);
    if width == 0 || height == 0 {
        report.note(
            path,
            format!("page size {width}x{height} is not positive, dropped"),
        );
        return None;
    }

    let sort_order = match obj.get("sortOrder") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let coerced = coerce_i64(v);
            if coerced.is_none() {
                report.note(format!("{path}.sortOrder"), format!("unusable sort order {v}, ignored"));
            }
            coerced
        }
    };

    let thumbnail = obj
        .get("thumbnail")
        .and_then(asset_ref)
        .or_else(|| geometry::thumbnail_ref(store, &image, thumbnail_width));

    let mut page = Page {
        page_number,
        image,
        thumbnail,
        width,
        height,
        sort_order,
        sections: Vec::new(),
    };

    page.sections = match obj.get("sections") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(s_index, item)| {
                normalize_section(&path, s_index, item, &page, store, now_ms, report)
            })
            .collect(),
        Some(_) => {
            report.note(format!("{path}.sections"), "sections is not an array, ignored");
            Vec::new()
        }
    };

    Some(page)
}

fn normalize_section(
    page_path: &str,
    index: usize,
    value: &Value,
    page: &Page,
    store: &dyn AssetStore,
    now_ms: i64,
    report: &mut NormalizeReport,
) -> Option<Section> {
    let path = format!("{page_path}.sections[{index}]");
    let Some(obj) = value.as_object() else {
        report.note(path, "section is not an object, dropped");
        return None;
    };
    ignore_unknown(obj, SECTION_KEYS, &path);

    let synthesized = now_ms + i64::try_from(index).unwrap_or(0);
    let id = match obj.get("id") {
        None | Some(Value::Null) => synthesized,
        Some(v) => coerce_i64(v).unwrap_or_else(|| {
            report.note(format!("{path}.id"), format!("unusable id {v}, using {synthesized}"));
            synthesized
        }),
    };

    let mut coord = |key: &str| match obj.get(key) {
        None | Some(Value::Null) => 0.0,
        Some(v) => coerce_f64(v).unwrap_or_else(|| {
            report.note(format!("{path}.{key}"), format!("unusable {key} {v}, using 0"));
            0.0
        }),
    };
    let rect = Rect::new(coord("x"), coord("y"), coord("width"), coord("height"));

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    let article_id = match obj.get("articleId") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Some(Section {
        id,
        slug: non_empty_str(obj.get("slug")),
        rect,
        title,
        body: non_empty_str(obj.get("body")),
        article_id,
        image_url: geometry::section_image_url(store, page, &rect),
    })
}

fn ignore_unknown(obj: &Map<String, Value>, known: &[&str], path: &str) {
    for key in obj.keys().filter(|k| !known.contains(&k.as_str())) {
        debug!(%path, %key, "ignoring unknown key");
    }
}

/// `{ "url": ..., "assetId": ... }` or a bare URL string.
fn asset_ref(value: &Value) -> Option<AssetRef> {
    let (url, asset_id) = match value {
        Value::String(url) => (url.as_str(), ""),
        Value::Object(obj) => (
            obj.get("url").and_then(Value::as_str).unwrap_or(""),
            obj.get("assetId").and_then(Value::as_str).unwrap_or(""),
        ),
        _ => return None,
    };
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    Some(AssetRef {
        url: url.to_string(),
        asset_id: asset_id.trim().to_string(),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coerce_i64(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value
        && let Some(i) = n.as_i64()
    {
        return Some(i);
    }
    let f = coerce_f64(value)?;
    (f >= i64::MIN as f64 && f <= i64::MAX as f64).then(|| f.trunc() as i64)
}

fn coerce_u32(value: &Value) -> Option<u32> {
    coerce_i64(value).and_then(|n| u32::try_from(n).ok())
}
