// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Broadsheet edition archive.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BroadsheetError, Result, ValidationErrors};

/// Public numeric identifier of an edition.
///
/// Allocated from wall-clock milliseconds at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditionId(pub i64);

impl EditionId {
    /// Allocate an id from the current wall-clock time in milliseconds.
    pub fn from_clock() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// The id one millisecond later, used when an allocated id is already taken.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Publication lifecycle of an edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditionStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl EditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for EditionStatus {
    type Err = BroadsheetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => {
                let mut errors = ValidationErrors::new();
                errors.add(
                    "status",
                    format!("unknown status '{other}' (expected draft, published, or archived)"),
                );
                Err(BroadsheetError::Validation(errors))
            }
        }
    }
}

impl fmt::Display for EditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an image held by the remote asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    /// Delivery URL of the asset (or of a derived rendition of it).
    pub url: String,
    /// Opaque asset id assigned by the store. Empty when unknown.
    #[serde(default)]
    pub asset_id: String,
}

impl AssetRef {
    pub fn has_asset_id(&self) -> bool {
        !self.asset_id.trim().is_empty()
    }
}

/// Rectangle in a page's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle has a positive, finite area.
    pub fn has_area(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// A rectangular overlay on a page, optionally tied to a canonical article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Page-local identifier.
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub rect: Rect,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Canonical article this section points at, if any.
    #[serde(default)]
    pub article_id: Option<String>,
    /// Cropped rendition of the page covering `rect`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One rasterized page image plus its geometry and section list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based page number.
    pub page_number: u32,
    pub image: AssetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<AssetRef>,
    /// Pixel width of the rasterized page.
    pub width: u32,
    /// Pixel height of the rasterized page.
    pub height: u32,
    /// Explicit ordering key; `page_number` is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Page {
    pub fn sort_key(&self) -> i64 {
        self.sort_order.unwrap_or(i64::from(self.page_number))
    }

    /// Page bounds as `(width, height)`.
    pub fn bounds(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Sort pages by explicit sort order, falling back to page number.
///
/// The sort is stable, so pages with equal keys keep their incoming order.
pub fn sort_pages(pages: &mut [Page]) {
    pages.sort_by_key(Page::sort_key);
}

/// A digitized newspaper issue: the root aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edition {
    pub id: EditionId,
    /// Database-native identifier; also names the edition's asset namespace.
    pub native_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub publication_date: NaiveDate,
    pub status: EditionStatus,
    pub pages: Vec<Page>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub cover_share_url: Option<String>,
}

impl Edition {
    pub fn new(id: EditionId, title: String, publication_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id,
            native_id: Uuid::new_v4(),
            title,
            slug: None,
            publication_date,
            status: EditionStatus::default(),
            pages: Vec::new(),
            created_at: now,
            updated_at: now,
            cover_share_url: None,
        }
    }

    /// Storage path prefix grouping every asset that belongs to this edition.
    pub fn namespace(&self, root: &str) -> String {
        edition_namespace(root, &self.native_id)
    }

    pub fn first_page(&self) -> Option<&Page> {
        self.pages.first()
    }
}

/// Namespace for an edition's assets under the configured root folder.
pub fn edition_namespace(root: &str, native_id: &Uuid) -> String {
    let root = root.trim_matches('/');
    if root.is_empty() {
        native_id.to_string()
    } else {
        format!("{root}/{native_id}")
    }
}

/// How a caller refers to an edition.
///
/// Parsed once at the boundary; downstream code matches on the variant
/// instead of re-inspecting the string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditionLookup {
    ByNativeId(Uuid),
    ById(EditionId),
    BySlug(String),
}

impl EditionLookup {
    /// Resolution order: native-id format, then numeric string, then slug.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BroadsheetError::MissingField("identifier"));
        }

        if let Ok(uuid) = Uuid::parse_str(trimmed) {
            return Ok(Self::ByNativeId(uuid));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit())
            && let Ok(id) = trimmed.parse::<i64>()
        {
            return Ok(Self::ById(EditionId(id)));
        }

        Ok(Self::BySlug(trimmed.to_string()))
    }
}

impl fmt::Display for EditionLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByNativeId(uuid) => write!(f, "native:{uuid}"),
            Self::ById(id) => write!(f, "id:{id}"),
            Self::BySlug(slug) => write!(f, "slug:{slug}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, sort_order: Option<i64>) -> Page {
        Page {
            page_number: number,
            image: AssetRef {
                url: format!("https://img.example/p{number}.jpg"),
                asset_id: format!("editions/x/page-{number:03}"),
            },
            thumbnail: None,
            width: 1000,
            height: 1500,
            sort_order,
            sections: Vec::new(),
        }
    }

    #[test]
    fn lookup_prefers_native_id_then_number_then_slug() {
        let uuid = Uuid::new_v4();
        assert_eq!(
            EditionLookup::parse(&uuid.to_string()).expect("parse"),
            EditionLookup::ByNativeId(uuid)
        );
        assert_eq!(
            EditionLookup::parse("1705312800000").expect("parse"),
            EditionLookup::ById(EditionId(1_705_312_800_000))
        );
        assert_eq!(
            EditionLookup::parse("आज-संस्करण").expect("parse"),
            EditionLookup::BySlug("आज-संस्करण".into())
        );
    }

    #[test]
    fn lookup_with_overflowing_digits_falls_back_to_slug() {
        let raw = "99999999999999999999999";
        assert_eq!(
            EditionLookup::parse(raw).expect("parse"),
            EditionLookup::BySlug(raw.into())
        );
    }

    #[test]
    fn empty_lookup_is_rejected() {
        assert!(matches!(
            EditionLookup::parse("   "),
            Err(BroadsheetError::MissingField("identifier"))
        ));
    }

    #[test]
    fn pages_sort_by_explicit_order_then_number() {
        let mut pages = vec![page(1, Some(3)), page(2, None), page(3, Some(1))];
        sort_pages(&mut pages);
        let order: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Archived".parse::<EditionStatus>().expect("parse"), EditionStatus::Archived);
        assert!("live".parse::<EditionStatus>().is_err());
    }

    #[test]
    fn section_serializes_rect_inline() {
        let section = Section {
            id: 7,
            slug: None,
            rect: Rect::new(10.0, 20.0, 300.0, 400.0),
            title: "untitled".into(),
            body: None,
            article_id: None,
            image_url: None,
        };
        let json = serde_json::to_value(&section).expect("serialize");
        assert_eq!(json["x"], 10.0);
        assert_eq!(json["height"], 400.0);
        assert!(json["articleId"].is_null());
    }

    #[test]
    fn namespace_uses_native_id_under_root() {
        let edition = Edition::new(
            EditionId(1),
            "आज".into(),
            NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
        );
        let ns = edition.namespace("/editions/");
        assert_eq!(ns, format!("editions/{}", edition.native_id));
    }
}
