//! Error types for the registry crate.

use std::path::PathBuf;

use janus_services::ServiceError;
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by persistence backends, the manager and the watcher.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Filesystem I/O failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted service record could not be parsed.
    #[error("failed to parse service definition {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A directory scan found unparsable records and the previous index was kept.
    #[error("service load rejected: {failed} definition(s) failed to parse")]
    LoadRejected {
        /// Number of records that failed.
        failed: usize,
    },

    /// A service name cannot be used as a file name.
    #[error("invalid service name for persistence: '{0}'")]
    InvalidName(String),

    /// Every id below the unsaved sentinel is taken.
    #[error("no service id left to assign")]
    IdsExhausted,

    /// No service with the given id exists.
    #[error("service {0} not found")]
    NotFound(i64),

    /// The configured service directory does not exist.
    #[error("service directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    /// The filesystem watcher failed.
    #[error("watch error: {0}")]
    Watch(String),

    /// The watched directory disappeared; hot reload has stopped.
    #[error("watched service directory is gone: {0}")]
    WatchDirectoryGone(PathBuf),

    /// A service definition is invalid.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl RegistryError {
    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a parse error.
    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// Check if a retry may succeed without changing the input.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::LoadRejected { .. } | Self::Watch(_))
    }

    /// Check if this error stops the watcher for good.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::WatchDirectoryGone(_) | Self::MissingDirectory(_))
    }
}
