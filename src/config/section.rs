//! `[pipeline]` and `[[bundle]]` sections.
//!
//! # Example
//!
//! ```toml
//! [pipeline]
//! root = "wwwroot"            # Directory routes and files resolve against
//! cache = true                # false = recompute on every request
//! watch = "native"            # "native" | "poll" | "off"
//! poll_interval_ms = 500      # Only used by watch = "poll"
//!
//! [[bundle]]
//! route = "/site.css"
//! files = ["css/a.css", "css/b.css"]
//! minify = true               # Minifier picked from the route's extension
//!
//! [[bundle]]
//! route = "/app.js"
//! files = ["js/app.js"]
//! [[bundle.transform]]
//! kind = "minify-js"
//! mangle = false
//! ```
//!
//! `watch = "off"` treats sources as immutable: cached results live for the
//! whole process.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::transform::{
    CssMinifier, CssSettings, JsMinifier, JsSettings, MinifyKind, SharedTransform,
};

/// Provider, cache and watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Root directory of the file provider.
    pub root: PathBuf,

    /// Cache transformed results.
    pub cache: bool,

    /// How source changes are detected.
    pub watch: WatchMode,

    /// Poll interval for `watch = "poll"`.
    pub poll_interval_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            cache: true,
            watch: WatchMode::Native,
            poll_interval_ms: 500,
        }
    }
}

/// File change detection backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// OS notifications
    #[default]
    Native,
    /// Periodic metadata scans, for network drives and containers
    Poll,
    /// No detection
    Off,
}

/// One `[[bundle]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub route: String,

    /// Sources, relative to `pipeline.root`, in concatenation order.
    pub files: Vec<PathBuf>,

    /// Shorthand for the minifier matching the route's extension.
    #[serde(default)]
    pub minify: bool,

    /// Explicit transforms, applied after `minify`.
    #[serde(default, rename = "transform", skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformEntry>,
}

impl BundleEntry {
    /// The transform chain this entry describes.
    pub fn transforms(&self) -> Vec<SharedTransform> {
        let shorthand = self
            .minify
            .then(|| MinifyKind::from_path(&self.route))
            .flatten()
            .map(MinifyKind::transform);

        shorthand
            .into_iter()
            .chain(self.transforms.iter().map(TransformEntry::transform))
            .collect()
    }
}

/// A `[[bundle.transform]]` table, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransformEntry {
    MinifyCss(CssSettings),
    MinifyJs(JsSettings),
}

impl TransformEntry {
    pub fn transform(&self) -> SharedTransform {
        match self {
            Self::MinifyCss(settings) => Arc::new(CssMinifier::new(settings.clone())),
            Self::MinifyJs(settings) => Arc::new(JsMinifier::new(settings.clone())),
        }
    }
}
