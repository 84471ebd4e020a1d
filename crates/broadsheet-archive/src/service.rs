// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edition service: create, update, fetch, delete and list editions.
//
// Creation runs the rasterizer on a blocking thread and streams finished
// pages over a channel; each page is uploaded as soon as it arrives, with at
// most `assets.upload_concurrency` uploads in flight. The edition is only
// persisted once every page has an asset reference. If anything fails after
// uploads may have started, the edition's namespace is deleted before the
// error is returned.
//
// Updates are read-modify-write without version checks: when two editors
// replace pages concurrently, the last write wins.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use broadsheet_assets::{AssetStore, UploadedAsset};
use broadsheet_core::config::BroadsheetConfig;
use broadsheet_core::error::{BroadsheetError, ErrorClass, Result, ValidationErrors, classify_error};
use broadsheet_core::types::{Edition, EditionId, EditionLookup, EditionStatus, Page};
use broadsheet_document::{RasterPage, Rasterizer, ScratchDir, sweep_scratch};

use crate::geometry::{self, CoverPreset};
use crate::normalize::{NormalizeReport, normalize_pages};
use crate::slug;
use crate::store::{EditionStore, InsertOutcome, ReplaceOutcome};

/// Top-level keys an update body may carry.
pub const UPDATE_FIELDS: &[&str] = &["title", "date", "status", "pages"];

/// Attempts at claiming a free id/slug before giving up.
const MAX_PERSIST_ATTEMPTS: usize = 16;

/// Rendered pages buffered between the rasterizer and the uploaders.
const RENDER_CHANNEL_DEPTH: usize = 2;

/// An update's result plus everything normalization changed on the way.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub edition: Edition,
    pub report: NormalizeReport,
}

/// A page that made it to the asset store.
struct UploadedPage {
    page_no: u32,
    width: u32,
    height: u32,
    asset: UploadedAsset,
}

/// Orchestrates the rasterizer, the asset store and the edition table.
pub struct EditionService {
    store: Arc<Mutex<EditionStore>>,
    assets: Arc<dyn AssetStore>,
    rasterizer: Arc<Rasterizer>,
    config: BroadsheetConfig,
}

impl EditionService {
    pub fn new(
        store: EditionStore,
        assets: Arc<dyn AssetStore>,
        rasterizer: Rasterizer,
        config: BroadsheetConfig,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            assets,
            rasterizer: Arc::new(rasterizer),
            config,
        }
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, EditionStore>> {
        self.store
            .lock()
            .map_err(|_| BroadsheetError::Database("edition store lock poisoned".into()))
    }

    // -- Create ---------------------------------------------------------------

    /// Digitize `pdf` into a new edition.
    #[instrument(skip(self, pdf), fields(pdf_len = pdf.len()))]
    pub async fn create(&self, pdf: Vec<u8>, title: &str, date: NaiveDate) -> Result<Edition> {
        let title = title.trim();
        if title.is_empty() {
            return Err(BroadsheetError::MissingField("title"));
        }
        if pdf.is_empty() {
            return Err(BroadsheetError::MissingField("pdf"));
        }

        let mut edition = Edition::new(EditionId::from_clock(), title.to_string(), date);
        let namespace = edition.namespace(&self.config.assets.root_folder);

        let pages = match self.rasterize_and_upload(pdf, &namespace).await {
            Ok(pages) => pages,
            Err(e) => {
                if classify_error(&e) != ErrorClass::Input {
                    warn!(%namespace, error = %e, "create failed, removing uploaded pages");
                    self.assets.delete_namespace(&namespace).await;
                }
                return Err(e);
            }
        };

        edition.pages = pages;
        edition.cover_share_url = Some(self.cover_url(&edition));

        match self.persist_new(edition) {
            Ok(edition) => {
                info!(
                    id = %edition.id,
                    slug = ?edition.slug,
                    pages = edition.pages.len(),
                    "edition created"
                );
                Ok(edition)
            }
            Err(e) => {
                error!(%namespace, error = %e, "edition could not be stored, removing uploaded pages");
                self.assets.delete_namespace(&namespace).await;
                Err(e)
            }
        }
    }

    async fn rasterize_and_upload(&self, pdf: Vec<u8>, namespace: &str) -> Result<Vec<Page>> {
        let scratch = ScratchDir::create_in(&self.config.scratch_dir)?;
        let (tx, mut rx) = mpsc::channel::<Result<RasterPage>>(RENDER_CHANNEL_DEPTH);
        let rasterizer = Arc::clone(&self.rasterizer);

        // Scratch lives and dies with the render thread.
        let render = tokio::task::spawn_blocking(move || -> Result<u32> {
            let pages = rasterizer.rasterize(&pdf, scratch.path())?;
            let total = pages.page_count();
            for page in pages {
                let failed = page.is_err();
                if tx.blocking_send(page).is_err() || failed {
                    break;
                }
            }
            Ok(total)
        });

        let permits = Arc::new(Semaphore::new(self.config.assets.upload_concurrency.max(1)));
        let mut uploads: JoinSet<Result<UploadedPage>> = JoinSet::new();
        let mut uploaded = Vec::new();
        let mut failure: Option<BroadsheetError> = None;

        while let Some(next) = rx.recv().await {
            let raster = match next {
                Ok(raster) => raster,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|e| BroadsheetError::Task(format!("upload limiter: {e}")))?;
            let assets = Arc::clone(&self.assets);
            let namespace = namespace.to_string();
            uploads.spawn(async move {
                let _permit = permit;
                let name = format!("page-{:03}", raster.page_no);
                let asset = assets.upload(raster.bytes, &namespace, &name).await?;
                Ok(UploadedPage {
                    page_no: raster.page_no,
                    width: raster.width,
                    height: raster.height,
                    asset,
                })
            });

            // Stop rendering as soon as an upload has failed.
            while let Some(done) = uploads.try_join_next() {
                match joined(done) {
                    Ok(page) => uploaded.push(page),
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            }
            if failure.is_some() {
                break;
            }
        }
        drop(rx);

        if failure.is_some() {
            uploads.abort_all();
        }
        while let Some(done) = uploads.join_next().await {
            match joined(done) {
                Ok(page) => uploaded.push(page),
                Err(e) if failure.is_none() => {
                    failure = Some(e);
                    uploads.abort_all();
                }
                Err(_) => {}
            }
        }

        let rendered = render.await;
        if let Some(e) = failure {
            return Err(e);
        }
        let total = rendered.map_err(|e| BroadsheetError::Task(format!("render task: {e}")))??;

        if uploaded.len() != total as usize {
            return Err(BroadsheetError::Task(format!(
                "expected {total} pages, uploaded {}",
                uploaded.len()
            )));
        }

        uploaded.sort_by_key(|p| p.page_no);
        let thumbnail_width = self.config.share.thumbnail_width;
        Ok(uploaded
            .into_iter()
            .map(|p| {
                let image = p.asset.asset_ref();
                Page {
                    page_number: p.page_no,
                    thumbnail: geometry::thumbnail_ref(self.assets.as_ref(), &image, thumbnail_width),
                    image,
                    width: p.width,
                    height: p.height,
                    sort_order: None,
                    sections: Vec::new(),
                }
            })
            .collect())
    }

    /// Insert `edition`, moving to the next id or a fresh slug on conflicts.
    fn persist_new(&self, mut edition: Edition) -> Result<Edition> {
        let store = self.lock_store()?;
        for _ in 0..MAX_PERSIST_ATTEMPTS {
            if edition.slug.is_none() {
                edition.slug = Some(slug::generate_unique(
                    &*store,
                    &edition.title,
                    None,
                    &self.config.slug,
                )?);
            }
            match store.insert(&edition)? {
                InsertOutcome::Inserted => return Ok(edition),
                InsertOutcome::IdTaken => {
                    debug!(id = %edition.id, "edition id taken, trying next");
                    edition.id = edition.id.next();
                }
                InsertOutcome::SlugTaken => {
                    debug!(slug = ?edition.slug, "slug claimed concurrently, probing again");
                    edition.slug = None;
                }
            }
        }
        Err(BroadsheetError::Database(format!(
            "no free id/slug after {MAX_PERSIST_ATTEMPTS} attempts"
        )))
    }

    fn cover_url(&self, edition: &Edition) -> String {
        geometry::cover_url(
            self.assets.as_ref(),
            edition,
            CoverPreset::EditionCover,
            &self.config.share.placeholder_url,
        )
    }

    /// Landscape link-preview image for `edition`.
    pub fn share_image_url(&self, edition: &Edition) -> String {
        geometry::cover_url(
            self.assets.as_ref(),
            edition,
            CoverPreset::ArticleShare,
            &self.config.share.placeholder_url,
        )
    }

    // -- Update ---------------------------------------------------------------

    /// Apply an update body (`title`, `date`, `status`, `pages`).
    ///
    /// Scalars replace their field. `pages`, when present, replaces the whole
    /// page array; sections left out of the payload are gone afterwards.
    #[instrument(skip(self, body), fields(lookup = %lookup))]
    pub fn update(&self, lookup: &EditionLookup, body: &Value) -> Result<UpdateOutcome> {
        let patch = UpdatePatch::parse(body)?;
        let mut edition = self.fetch(lookup)?;

        let mut retitled = false;
        if let Some(title) = patch.title
            && title != edition.title
        {
            edition.title = title;
            retitled = true;
        }
        if let Some(date) = patch.date {
            edition.publication_date = date;
        }
        if let Some(status) = patch.status {
            edition.status = status;
        }

        let mut report = NormalizeReport::default();
        if let Some(raw_pages) = patch.pages {
            let (pages, normalized) = normalize_pages(
                &raw_pages,
                self.assets.as_ref(),
                self.config.share.thumbnail_width,
            );
            edition.pages = pages;
            edition.cover_share_url = Some(self.cover_url(&edition));
            report = normalized;
        }
        edition.updated_at = Utc::now();

        let edition = self.persist_existing(edition, retitled, lookup)?;
        info!(id = %edition.id, warnings = report.warnings.len(), "edition updated");
        Ok(UpdateOutcome { edition, report })
    }

    /// Replace the stored row, re-deriving the slug when the title changed
    /// or the current slug was claimed by someone else in the meantime.
    fn persist_existing(
        &self,
        mut edition: Edition,
        mut regenerate_slug: bool,
        lookup: &EditionLookup,
    ) -> Result<Edition> {
        let store = self.lock_store()?;
        for _ in 0..MAX_PERSIST_ATTEMPTS {
            if regenerate_slug {
                edition.slug = Some(slug::generate_unique(
                    &*store,
                    &edition.title,
                    Some(edition.id),
                    &self.config.slug,
                )?);
            }
            match store.replace(&edition)? {
                ReplaceOutcome::Updated => return Ok(edition),
                ReplaceOutcome::SlugTaken => {
                    debug!(slug = ?edition.slug, "slug claimed concurrently, probing again");
                    regenerate_slug = true;
                }
                ReplaceOutcome::Missing => return Err(BroadsheetError::NotFound(lookup.to_string())),
            }
        }
        Err(BroadsheetError::Database(format!(
            "no free slug after {MAX_PERSIST_ATTEMPTS} attempts"
        )))
    }

    // -- Read / delete --------------------------------------------------------

    pub fn fetch(&self, lookup: &EditionLookup) -> Result<Edition> {
        self.lock_store()?
            .get(lookup)?
            .ok_or_else(|| BroadsheetError::NotFound(lookup.to_string()))
    }

    pub fn list(&self, status: Option<EditionStatus>) -> Result<Vec<Edition>> {
        self.lock_store()?.list(status)
    }

    /// Remove the edition, then its remote assets on a best-effort basis.
    #[instrument(skip(self), fields(lookup = %lookup))]
    pub async fn delete(&self, lookup: &EditionLookup) -> Result<Edition> {
        let edition = {
            let store = self.lock_store()?;
            let edition = store
                .get(lookup)?
                .ok_or_else(|| BroadsheetError::NotFound(lookup.to_string()))?;
            if !store.delete(edition.id)? {
                return Err(BroadsheetError::NotFound(lookup.to_string()));
            }
            edition
        };

        self.assets
            .delete_namespace(&edition.namespace(&self.config.assets.root_folder))
            .await;
        Ok(edition)
    }

    /// Clear the scratch root. Not safe while a create is in flight.
    pub fn sweep_scratch(&self) -> usize {
        sweep_scratch(&self.config.scratch_dir)
    }
}

fn joined(done: std::result::Result<Result<UploadedPage>, JoinError>) -> Result<UploadedPage> {
    done.map_err(|e| BroadsheetError::Task(format!("upload task: {e}")))?
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (date part is kept).
pub fn parse_publication_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// A validated update body.
struct UpdatePatch {
    title: Option<String>,
    date: Option<NaiveDate>,
    status: Option<EditionStatus>,
    pages: Option<Vec<Value>>,
}

impl UpdatePatch {
    fn parse(body: &Value) -> Result<Self> {
        let mut errors = ValidationErrors::new();
        let Some(obj) = body.as_object() else {
            errors.add("body", "expected a JSON object");
            return Err(BroadsheetError::Validation(errors));
        };

        for key in obj.keys().filter(|k| !UPDATE_FIELDS.contains(&k.as_str())) {
            errors.add(key.as_str(), "unknown field");
        }

        let title = match obj.get("title") {
            None => None,
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(_) => {
                errors.add("title", "must be a non-empty string");
                None
            }
        };

        let date = match obj.get("date") {
            None => None,
            Some(Value::String(s)) => {
                let parsed = parse_publication_date(s);
                if parsed.is_none() {
                    errors.add("date", "expected YYYY-MM-DD or an RFC 3339 timestamp");
                }
                parsed
            }
            Some(_) => {
                errors.add("date", "must be a string");
                None
            }
        };

        let status = match obj.get("status") {
            None => None,
            Some(Value::String(s)) => match s.parse::<EditionStatus>() {
                Ok(status) => Some(status),
                Err(_) => {
                    errors.add("status", format!("unknown status '{s}'"));
                    None
                }
            },
            Some(_) => {
                errors.add("status", "must be a string");
                None
            }
        };

        let pages = match obj.get("pages") {
            None => None,
            Some(Value::Array(items)) => Some(items.clone()),
            Some(_) => {
                errors.add("pages", "must be an array");
                None
            }
        };

        errors.into_result()?;
        Ok(Self {
            title,
            date,
            status,
            pages,
        })
    }
}
