//! File providers: where asset sources come from.
//!
//! The pipeline needs exactly two things from storage: read a file, and get
//! told (once) when it changes. Paths handed to a provider are relative to
//! its root; absolute paths are used as-is.

mod memory;
mod physical;

use std::io;
use std::path::Path;

use crate::watch::{OnChange, WatchError, WatchToken};

pub use memory::MemoryFileProvider;
pub use physical::PhysicalFileProvider;

/// Storage backend consumed by the pipeline.
pub trait FileProvider: Send + Sync {
    /// Read a whole file. A missing file is `io::ErrorKind::NotFound`.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Run `on_change` once when `path` changes, is renamed or deleted.
    fn watch(&self, path: &Path, on_change: OnChange) -> Result<WatchToken, WatchError>;

    /// Whether `path` exists as a file.
    fn exists(&self, path: &Path) -> bool {
        self.read_file(path).is_ok()
    }
}
