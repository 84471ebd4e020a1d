// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit data directory.
pub const ENV_DATA_DIR: &str = "BROADSHEET_DATA_DIR";

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = match std::env::var_os(ENV_DATA_DIR) {
        Some(explicit) => PathBuf::from(explicit),
        None => base_dir().join("broadsheet"),
    };
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Resolve a configured path: relative paths live under `dir`.
pub fn resolve(dir: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        dir.join(configured)
    }
}

fn base_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_land_in_data_dir() {
        let dir = Path::new("/var/lib/broadsheet");
        assert_eq!(
            resolve(dir, Path::new("broadsheet.db")),
            PathBuf::from("/var/lib/broadsheet/broadsheet.db")
        );
        assert_eq!(
            resolve(dir, Path::new("/srv/editions.db")),
            PathBuf::from("/srv/editions.db")
        );
    }
}
