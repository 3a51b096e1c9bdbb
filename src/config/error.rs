//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::PipelineError;
use crate::watch::WatchError;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("config validation error:\n{0}")]
    Validation(String),

    #[error("failed to start the file watcher")]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("bundle.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("bundle.toml"));

        let err = ConfigError::Validation("- [[bundle]] #1: no files".to_string());
        assert!(format!("{err}").contains("no files"));

        let err: ConfigError = PipelineError::DuplicateRoute("/a.css".into()).into();
        assert_eq!(format!("{err}"), "route `/a.css` is already registered");
    }
}
