// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BroadsheetError, Result};

/// Environment variable overriding `assets.api_key`.
pub const ENV_API_KEY: &str = "BROADSHEET_ASSET_API_KEY";
/// Environment variable overriding `assets.api_secret`.
pub const ENV_API_SECRET: &str = "BROADSHEET_ASSET_API_SECRET";

/// Persistent settings for the edition archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadsheetConfig {
    /// SQLite database holding edition rows.
    pub database_path: PathBuf,
    /// Root for per-upload scratch directories.
    pub scratch_dir: PathBuf,
    pub render: RenderConfig,
    pub assets: AssetStoreConfig,
    pub slug: SlugConfig,
    pub share: ShareConfig,
}

impl Default for BroadsheetConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("broadsheet.db"),
            scratch_dir: std::env::temp_dir().join("broadsheet-scratch"),
            render: RenderConfig::default(),
            assets: AssetStoreConfig::default(),
            slug: SlugConfig::default(),
            share: ShareConfig::default(),
        }
    }
}

impl BroadsheetConfig {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let parsed: Self = serde_json::from_str(&data).map_err(|e| {
                BroadsheetError::Config(format!("{}: {e}", path.display()))
            })?;
            info!(path = %path.display(), "configuration loaded");
            parsed
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Write settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Replace asset-store credentials with values from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            self.assets.api_key = key;
        }
        if let Ok(secret) = std::env::var(ENV_API_SECRET) {
            self.assets.api_secret = secret;
        }
    }
}

/// Rasterizer backend identifiers, tried in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// PDFium bound as a dynamic library.
    Pdfium,
    /// Poppler's `pdftoppm` executable.
    Pdftoppm,
}

/// PDF rasterization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Oversampling factor relative to the nominal page size (72 dpi).
    pub scale: f32,
    /// JPEG quality for stored page images (1-100).
    pub jpeg_quality: u8,
    pub backends: Vec<BackendKind>,
    /// Directory containing the PDFium shared library; system paths are
    /// searched when unset.
    pub pdfium_library_dir: Option<PathBuf>,
    pub pdftoppm_binary: PathBuf,
}

impl RenderConfig {
    pub const MIN_SCALE: f32 = 2.0;
    pub const MAX_SCALE: f32 = 3.5;

    /// Scale clamped to the range where crops stay legible after compression.
    pub fn effective_scale(&self) -> f32 {
        if self.scale.is_finite() {
            self.scale.clamp(Self::MIN_SCALE, Self::MAX_SCALE)
        } else {
            Self::default().scale
        }
    }

    pub fn effective_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: 2.5,
            jpeg_quality: 82,
            backends: vec![BackendKind::Pdfium, BackendKind::Pdftoppm],
            pdfium_library_dir: None,
            pdftoppm_binary: PathBuf::from("pdftoppm"),
        }
    }
}

/// Remote asset store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetStoreConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Delivery prefix that derived URLs are appended to.
    /// Defaults to `https://res.cloudinary.com/{cloud_name}/image/upload`.
    pub delivery_base_url: Option<String>,
    pub api_base_url: String,
    /// Folder under which every edition namespace lives.
    pub root_folder: String,
    /// Maximum page uploads in flight per edition.
    pub upload_concurrency: usize,
    pub request_timeout_secs: u64,
}

impl AssetStoreConfig {
    pub fn delivery_base(&self) -> String {
        match &self.delivery_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://res.cloudinary.com/{}/image/upload", self.cloud_name),
        }
    }
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            delivery_base_url: None,
            api_base_url: "https://api.cloudinary.com/v1_1".into(),
            root_folder: "editions".into(),
            upload_concurrency: 4,
            request_timeout_secs: 60,
        }
    }
}

/// Slug generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlugConfig {
    /// Localized word for "article", used when the text yields no usable slug.
    pub fallback_prefix: String,
    pub max_len: usize,
    /// Numbered candidates probed before falling back to a timestamp suffix.
    pub max_probes: u32,
}

impl Default for SlugConfig {
    fn default() -> Self {
        Self {
            fallback_prefix: "लेख".into(),
            max_len: 100,
            max_probes: 1000,
        }
    }
}

/// Share/preview image settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Returned when an edition has no page asset to derive a cover from.
    pub placeholder_url: String,
    /// Width of derived page thumbnails in pixels.
    pub thumbnail_width: u32,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            placeholder_url: "https://static.broadsheet.example/placeholder-cover.jpg".into(),
            thumbnail_width: 320,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = BroadsheetConfig::load(dir.path().join("absent.json")).expect("load");
        assert_eq!(config.slug.max_len, 100);
        assert_eq!(
            config.render.backends,
            vec![BackendKind::Pdfium, BackendKind::Pdftoppm]
        );
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("broadsheet.json");
        std::fs::write(
            &path,
            r#"{ "render": { "scale": 3.0, "backends": ["pdftoppm"] }, "assets": { "cloud_name": "daily" } }"#,
        )
        .expect("write");

        let config = BroadsheetConfig::load(&path).expect("load");
        assert_eq!(config.render.scale, 3.0);
        assert_eq!(config.render.backends, vec![BackendKind::Pdftoppm]);
        assert_eq!(config.render.jpeg_quality, 82);
        assert_eq!(
            config.assets.delivery_base(),
            "https://res.cloudinary.com/daily/image/upload"
        );
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("broadsheet.json");
        std::fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            BroadsheetConfig::load(&path),
            Err(BroadsheetError::Config(_))
        ));
    }

    #[test]
    fn scale_is_clamped_to_legible_range() {
        let mut render = RenderConfig {
            scale: 10.0,
            ..Default::default()
        };
        assert_eq!(render.effective_scale(), RenderConfig::MAX_SCALE);
        render.scale = 0.5;
        assert_eq!(render.effective_scale(), RenderConfig::MIN_SCALE);
        render.scale = f32::NAN;
        assert_eq!(render.effective_scale(), 2.5);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("broadsheet.json");
        let mut config = BroadsheetConfig::default();
        config.slug.fallback_prefix = "article".into();
        config.save(&path).expect("save");

        let loaded = BroadsheetConfig::load(&path).expect("load");
        assert_eq!(loaded.slug.fallback_prefix, "article");
    }
}
