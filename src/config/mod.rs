//! Bundle configuration management for `bundle.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── error      # ConfigError
//! ├── section    # [pipeline] and [[bundle]]
//! ├── util       # Config file lookup
//! └── mod.rs     # BundleConfig (this file)
//! ```
//!
//! Relative paths in `[pipeline]` resolve against the directory holding the
//! config file. Bundle `files` stay relative to `pipeline.root`.

mod error;
mod section;
mod util;

use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cache::ResultCache;
use crate::log;
use crate::pipeline::AssetPipeline;
use crate::provider::PhysicalFileProvider;
use crate::transform::MinifyKind;
use crate::utils::path::{normalize_path, normalize_route, resolve_path, route_key};
use crate::watch::{FileChangeWatcher, WatchError};

pub use error::ConfigError;
pub use section::{BundleEntry, PipelineSection, TransformEntry, WatchMode};
pub use util::find_config_file;

/// Root configuration structure representing bundle.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default, rename = "bundle")]
    pub bundles: Vec<BundleEntry>,
}

impl BundleConfig {
    /// Load, normalize and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (mut config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.config_path = normalize_path(path);
        let base = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.normalize_paths(&base);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    fn normalize_paths(&mut self, base: &Path) {
        self.pipeline.root = normalize_path(&resolve_path(&self.pipeline.root, base));
    }

    /// Check every entry, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if !self.pipeline.root.is_dir() {
            problems.push(format!(
                "[pipeline] root `{}` is not a directory",
                self.pipeline.root.display()
            ));
        }
        if self.pipeline.watch == WatchMode::Poll && self.pipeline.poll_interval_ms == 0 {
            problems.push("[pipeline] poll_interval_ms must be positive".to_string());
        }

        let mut seen: FxHashMap<String, usize> = FxHashMap::default();
        for (index, bundle) in self.bundles.iter().enumerate() {
            let at = format!("[[bundle]] #{} `{}`", index + 1, bundle.route);

            if normalize_route(&bundle.route) == "/" {
                problems.push(format!("{at}: route must name a file"));
            } else {
                match seen.entry(route_key(&bundle.route)) {
                    Entry::Occupied(first) => problems.push(format!(
                        "{at}: route already used by bundle #{}",
                        first.get() + 1
                    )),
                    Entry::Vacant(slot) => {
                        slot.insert(index);
                    }
                }
            }
            if bundle.files.is_empty() {
                problems.push(format!("{at}: no files"));
            }
            if bundle.minify && MinifyKind::from_path(&bundle.route).is_none() {
                problems.push(format!(
                    "{at}: `minify = true` needs a .css or .js route, use [[bundle.transform]]"
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(
                problems
                    .iter()
                    .map(|p| format!("- {p}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ))
        }
    }

    /// Watcher for `[pipeline] watch`.
    pub fn watcher(&self) -> Result<FileChangeWatcher, WatchError> {
        match self.pipeline.watch {
            WatchMode::Native => FileChangeWatcher::native(),
            WatchMode::Poll => FileChangeWatcher::polling(Duration::from_millis(
                self.pipeline.poll_interval_ms,
            )),
            WatchMode::Off => Ok(FileChangeWatcher::manual()),
        }
    }

    /// Build a pipeline over `pipeline.root` with every bundle registered.
    pub fn build_pipeline(&self) -> Result<AssetPipeline, ConfigError> {
        let provider = Arc::new(PhysicalFileProvider::new(
            &self.pipeline.root,
            self.watcher()?,
        ));
        let cache = if self.pipeline.cache {
            ResultCache::new()
        } else {
            ResultCache::disabled()
        };

        let pipeline = AssetPipeline::with_cache(provider, Arc::new(cache));
        for bundle in &self.bundles {
            pipeline.register(&bundle.route, bundle.files.iter().cloned(), bundle.transforms())?;
        }
        Ok(pipeline)
    }
}
