// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-operation scratch directories for intermediate render files.

use std::path::Path;

use broadsheet_core::error::{BroadsheetError, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// A uniquely named directory under the scratch root, removed on drop.
///
/// Each create operation gets its own directory, so concurrent uploads never
/// share intermediate files.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
}

impl ScratchDir {
    /// Create a fresh directory inside `root`, creating `root` if needed.
    pub fn create_in(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(root)
            .map_err(|e| {
                BroadsheetError::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot create scratch directory in {}: {e}", root.display()),
                ))
            })?;
        debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
            }
        }
    }
}

/// Remove everything under the scratch root.
///
/// Meant for startup or an operator command. Running it while a create
/// operation is in flight deletes that operation's intermediate files.
/// Returns the number of entries removed.
pub fn sweep_scratch(root: &Path) -> usize {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "cannot read scratch root");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let outcome = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match outcome {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "could not sweep scratch entry"),
        }
    }

    info!(root = %root.display(), removed, "scratch root swept");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_removed_on_drop() {
        let root = tempfile::TempDir::new().expect("root");
        let path = {
            let scratch = ScratchDir::create_in(root.path()).expect("scratch");
            std::fs::write(scratch.path().join("page-0001.png"), b"x").expect("write");
            assert!(scratch.path().starts_with(root.path()));
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_scratch_dirs_are_distinct() {
        let root = tempfile::TempDir::new().expect("root");
        let a = ScratchDir::create_in(root.path()).expect("a");
        let b = ScratchDir::create_in(root.path()).expect("b");
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn creates_missing_root() {
        let parent = tempfile::TempDir::new().expect("parent");
        let root = parent.path().join("nested").join("scratch");
        let scratch = ScratchDir::create_in(&root).expect("scratch");
        assert!(scratch.path().is_dir());
    }

    #[test]
    fn sweep_removes_leftovers() {
        let root = tempfile::TempDir::new().expect("root");
        std::fs::create_dir(root.path().join("upload-stale")).expect("dir");
        std::fs::write(root.path().join("upload-stale").join("a.png"), b"x").expect("file");
        std::fs::write(root.path().join("stray.pdf"), b"x").expect("file");

        assert_eq!(sweep_scratch(root.path()), 2);
        assert_eq!(std::fs::read_dir(root.path()).expect("read").count(), 0);
    }

    #[test]
    fn sweep_of_missing_root_is_noop() {
        let parent = tempfile::TempDir::new().expect("parent");
        assert_eq!(sweep_scratch(&parent.path().join("absent")), 0);
    }
}
