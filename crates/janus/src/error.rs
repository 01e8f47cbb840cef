//! Errors raised while starting or stopping a [`Runtime`](crate::Runtime).

use janus_config::ConfigError;
use janus_registry::RegistryError;
use janus_telemetry::TelemetryError;
use thiserror::Error;

/// Result type for runtime operations.
pub type JanusResult<T> = Result<T, JanusError>;

/// Runtime bootstrap and shutdown errors.
#[derive(Debug, Error)]
pub enum JanusError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or metrics failed to initialize.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The registry failed to start or a background task failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for JanusError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
