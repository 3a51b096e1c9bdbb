//! In-memory files, for embedding and tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use super::FileProvider;
use crate::watch::{FileChangeWatcher, OnChange, WatchError, WatchToken};

/// Root that relative paths are anchored to.
const MEMORY_ROOT: &str = "/memory";

/// A file provider backed by a map. Writes and removals fire watchers.
#[derive(Debug)]
pub struct MemoryFileProvider {
    files: DashMap<PathBuf, Vec<u8>>,
    watcher: FileChangeWatcher,
    reads: AtomicUsize,
}

impl MemoryFileProvider {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
            watcher: FileChangeWatcher::manual(),
            reads: AtomicUsize::new(0),
        }
    }

    /// Create or replace a file, firing its watchers.
    pub fn write(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let key = Self::key(path.as_ref());
        self.files.insert(key.clone(), content.into());
        self.watcher.notify_changed(&key);
    }

    /// Delete a file, firing its watchers.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let key = Self::key(path.as_ref());
        let removed = self.files.remove(&key).is_some();
        self.watcher.notify_changed(&key);
        removed
    }

    /// Number of successful and failed reads so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn watcher(&self) -> &FileChangeWatcher {
        &self.watcher
    }

    fn key(path: &Path) -> PathBuf {
        Path::new(MEMORY_ROOT).join(path.strip_prefix("/").unwrap_or(path))
    }
}

impl Default for MemoryFileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FileProvider for MemoryFileProvider {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(&Self::key(path))
            .map(|content| content.clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("`{}` not found", path.display()),
                )
            })
    }

    fn watch(&self, path: &Path, on_change: OnChange) -> Result<WatchToken, WatchError> {
        self.watcher.watch(&Self::key(path), on_change)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&Self::key(path))
    }
}
