// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process asset store for tests, benches and `--dry-run`.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use broadsheet_core::error::{BroadsheetError, Result};
use tracing::{debug, warn};

use crate::store::{AssetStore, UploadedAsset, asset_id};
use crate::transform::{TransformParams, render_url};

/// Keeps uploaded bytes in a map keyed by asset id.
///
/// Can be told to start failing uploads after a number of successes, which
/// is how the create pipeline's compensating cleanup gets exercised.
pub struct InMemoryAssetStore {
    base_url: String,
    assets: Mutex<BTreeMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
    fail_after: Option<usize>,
    namespace_deletions: Mutex<Vec<String>>,
}

impl InMemoryAssetStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            assets: Mutex::new(BTreeMap::new()),
            uploads: AtomicUsize::new(0),
            fail_after: None,
            namespace_deletions: Mutex::new(Vec::new()),
        }
    }

    /// Accept `successes` uploads, then fail every one after.
    pub fn failing_after(mut self, successes: usize) -> Self {
        self.fail_after = Some(successes);
        self
    }

    pub fn asset_ids(&self) -> Vec<String> {
        match self.assets.lock() {
            Ok(assets) => assets.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.asset_ids().iter().any(|id| id == asset_id)
    }

    /// Prefixes passed to `delete_namespace`, in call order.
    pub fn namespace_deletions(&self) -> Vec<String> {
        match self.namespace_deletions.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn upload(&self, bytes: Vec<u8>, namespace: &str, name: &str) -> Result<UploadedAsset> {
        let attempt = self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| attempt >= limit) {
            return Err(BroadsheetError::Upload(format!(
                "in-memory store refusing upload #{}",
                attempt + 1
            )));
        }

        let (width, height) = ::image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| BroadsheetError::Upload(format!("unreadable image: {e}")))?
            .into_dimensions()
            .map_err(|e| BroadsheetError::Upload(format!("unreadable image: {e}")))?;

        let id = asset_id(namespace, name);
        let asset = UploadedAsset {
            delivery_url: format!("{}/{id}", self.base_url.trim_end_matches('/')),
            asset_id: id.clone(),
            width,
            height,
            byte_size: bytes.len() as u64,
        };

        self.assets
            .lock()
            .map_err(|_| BroadsheetError::Upload("asset map lock poisoned".into()))?
            .insert(id, bytes);
        debug!(asset_id = %asset.asset_id, "stored in memory");
        Ok(asset)
    }

    async fn delete(&self, asset_id: &str) {
        match self.assets.lock() {
            Ok(mut assets) => {
                assets.remove(asset_id);
            }
            Err(_) => warn!(asset_id, "asset map lock poisoned, delete skipped"),
        }
    }

    async fn delete_namespace(&self, prefix: &str) {
        if let Ok(mut calls) = self.namespace_deletions.lock() {
            calls.push(prefix.to_string());
        }
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        match self.assets.lock() {
            Ok(mut assets) => assets.retain(|id, _| !id.starts_with(&prefix)),
            Err(_) => warn!(%prefix, "asset map lock poisoned, namespace delete skipped"),
        }
    }

    fn derived_url(&self, asset_id: &str, params: &TransformParams) -> String {
        render_url(&self.base_url, asset_id, params)
    }
}
