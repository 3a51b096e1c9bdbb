//! Files on disk under a root directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::FileProvider;
use crate::utils::path::{normalize_path, resolve_path};
use crate::watch::{FileChangeWatcher, OnChange, WatchError, WatchToken};

/// Reads from a directory and watches it through a [`FileChangeWatcher`].
#[derive(Debug, Clone)]
pub struct PhysicalFileProvider {
    root: PathBuf,
    watcher: FileChangeWatcher,
}

impl PhysicalFileProvider {
    pub fn new(root: impl AsRef<Path>, watcher: FileChangeWatcher) -> Self {
        Self {
            root: normalize_path(root.as_ref()),
            watcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watcher(&self) -> &FileChangeWatcher {
        &self.watcher
    }

    /// Absolute path of a provider-relative path.
    pub fn full_path(&self, path: &Path) -> PathBuf {
        resolve_path(path, &self.root)
    }
}

impl FileProvider for PhysicalFileProvider {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let full = self.full_path(path);
        if full.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("`{}` is a directory", full.display()),
            ));
        }
        fs::read(full)
    }

    fn watch(&self, path: &Path, on_change: OnChange) -> Result<WatchToken, WatchError> {
        self.watcher.watch(&self.full_path(path), on_change)
    }

    fn exists(&self, path: &Path) -> bool {
        self.full_path(path).is_file()
    }
}
