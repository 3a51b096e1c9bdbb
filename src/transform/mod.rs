//! Content transforms applied to an asset's concatenated sources.
//!
//! A transform is a deterministic `&str -> String` step. Its identity (name
//! plus settings) is part of every fingerprint the transform takes part in,
//! so changing settings never serves a result produced with the old ones.

mod minify;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::fingerprint::RequestContext;

pub use minify::{CssMinifier, CssSettings, JsMinifier, JsSettings, MinifyKind};

/// Shared handle to a transform, as stored in an asset's chain.
pub type SharedTransform = Arc<dyn ContentTransform>;

/// A single step in an asset's transform chain.
pub trait ContentTransform: Send + Sync + fmt::Debug {
    /// Stable identity of this transform and its settings.
    fn identity(&self) -> String;

    /// Request-dependent part of the cache key.
    ///
    /// Empty unless the output varies per request (e.g. by negotiated encoding).
    fn cache_key(&self, _context: &RequestContext) -> String {
        String::new()
    }

    /// Transform `input`. An error leaves the asset's content untouched.
    fn apply(&self, input: &str) -> Result<String, TransformError>;
}

/// A transform could not process its input.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("{transform}: parse error: {message}")]
    Parse {
        transform: &'static str,
        message: String,
    },

    #[error("{transform}: {message}")]
    Output {
        transform: &'static str,
        message: String,
    },
}

/// Render settings as a stable identity suffix.
///
/// `serde_json` keeps struct field order, so equal settings always render
/// identically.
pub(crate) fn identity_of<S: serde::Serialize>(name: &str, settings: &S) -> String {
    let settings = serde_json::to_string(settings).unwrap_or_default();
    format!("{name}{settings}")
}
