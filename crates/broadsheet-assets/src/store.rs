// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The asset store seam.

use async_trait::async_trait;
use broadsheet_core::error::Result;
use broadsheet_core::types::AssetRef;
use serde::{Deserialize, Serialize};

use crate::transform::TransformParams;

/// What the store reports back for one uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAsset {
    pub delivery_url: String,
    pub asset_id: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
}

impl UploadedAsset {
    pub fn asset_ref(&self) -> AssetRef {
        AssetRef {
            url: self.delivery_url.clone(),
            asset_id: self.asset_id.clone(),
        }
    }
}

/// A remote, URL-addressable image store.
///
/// Deletions never fail from the caller's point of view: they are cleanup
/// steps, so implementations log errors and return.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `bytes` as `{namespace}/{name}`. Fails with `Upload`.
    async fn upload(&self, bytes: Vec<u8>, namespace: &str, name: &str) -> Result<UploadedAsset>;

    /// Remove one asset. Deleting an unknown id is not an error.
    async fn delete(&self, asset_id: &str);

    /// Remove every asset whose id starts with `prefix`.
    async fn delete_namespace(&self, prefix: &str);

    /// URL of a transformed rendition. Pure, no network I/O; the provider
    /// materializes the rendition on first fetch.
    fn derived_url(&self, asset_id: &str, params: &TransformParams) -> String;
}

/// Asset id for `name` within `namespace`.
pub fn asset_id(namespace: &str, name: &str) -> String {
    let namespace = namespace.trim_matches('/');
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_joins_namespace() {
        assert_eq!(asset_id("editions/abc/", "page-001"), "editions/abc/page-001");
        assert_eq!(asset_id("", "page-001"), "page-001");
    }

    #[test]
    fn uploaded_asset_serializes_camel_case() {
        let asset = UploadedAsset {
            delivery_url: "https://cdn/x.jpg".into(),
            asset_id: "x".into(),
            width: 10,
            height: 20,
            byte_size: 300,
        };
        let json = serde_json::to_value(&asset).expect("serialize");
        assert_eq!(json["deliveryUrl"], "https://cdn/x.jpg");
        assert_eq!(json["byteSize"], 300);
        assert_eq!(asset.asset_ref().asset_id, "x");
    }
}
