//! Pipeline error types.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by registration and execution.
///
/// `Clone` so a single computation's outcome can be handed to every caller
/// waiting on the same fingerprint.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("route `{0}` is already registered")]
    DuplicateRoute(String),

    #[error("invalid configuration for `{route}`: {reason}")]
    InvalidConfiguration { route: String, reason: String },

    #[error("file or bundle `{0}` doesn't exist")]
    AssetNotFound(String),

    #[error("failed to read source `{}`", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("execution of `{0}` was aborted")]
    Aborted(String),
}

impl PipelineError {
    pub(crate) fn invalid(route: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            route: route.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn source_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::SourceRead {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Whether this error means "nothing to serve" rather than a broken asset.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AssetNotFound(_))
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
