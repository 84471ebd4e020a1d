// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service wiring: loads configuration, opens the edition database, and picks
// the asset store and render backends the edition service runs on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use broadsheet_archive::{EditionService, EditionStore};
use broadsheet_assets::{AssetStore, HostedAssetStore, InMemoryAssetStore};
use broadsheet_core::config::BroadsheetConfig;
use broadsheet_core::error::Result;
use broadsheet_document::Rasterizer;
use tracing::info;

use crate::data_dir;

/// Everything a command needs.
pub struct AppServices {
    pub editions: EditionService,
    pub config: BroadsheetConfig,
}

impl AppServices {
    /// Build services from the configuration at `config_path` (or the
    /// default location).
    ///
    /// A dry run keeps both the database and the asset store in memory, so
    /// nothing outlives the process. Useful for checking that a PDF renders.
    pub fn init(config_path: Option<&Path>, dry_run: bool) -> Result<Self> {
        let dir = data_dir::data_dir();
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(data_dir::default_config_path);

        let mut config = BroadsheetConfig::load(&config_path)?;
        config.database_path = data_dir::resolve(&dir, &config.database_path);
        config.scratch_dir = data_dir::resolve(&dir, &config.scratch_dir);

        let rasterizer = Rasterizer::from_config(&config.render);
        info!(
            backends = ?rasterizer.backend_names(),
            dry_run,
            config = %config_path.display(),
            "initialising services"
        );

        let (store, assets): (EditionStore, Arc<dyn AssetStore>) = if dry_run {
            (
                EditionStore::open_in_memory()?,
                Arc::new(InMemoryAssetStore::new(config.assets.delivery_base())),
            )
        } else {
            (
                EditionStore::open(&config.database_path)?,
                Arc::new(HostedAssetStore::new(config.assets.clone())?),
            )
        };

        Ok(Self {
            editions: EditionService::new(store, assets, rasterizer, config.clone()),
            config,
        })
    }
}

/// Write the default configuration to `path`, refusing to overwrite.
pub fn write_default_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(data_dir::default_config_path);
    if path.exists() {
        return Err(broadsheet_core::BroadsheetError::Config(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    BroadsheetConfig::default().save(&path)?;
    info!(path = %path.display(), "default configuration written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_written_once() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let written = write_default_config(Some(&path)).expect("write");
        assert_eq!(written, path);
        let loaded = BroadsheetConfig::load(&path).expect("load");
        assert_eq!(loaded.slug.max_len, 100);

        assert!(write_default_config(Some(&path)).is_err());
    }
}
