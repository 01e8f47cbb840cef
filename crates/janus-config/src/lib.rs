//! Typed configuration for Janus.
//!
//! This crate provides the configuration of a Janus deployment with support
//! for:
//! - TOML and JSON configuration files
//! - Environment variable overrides and `.env` files
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`JanusConfig`] has three sections:
//!
//! - [`RegistryConfig`] - persistence backend, hot reload and load policy
//! - [`ReleaseConfig`] - pseudonymous id salt and consent tracking
//! - [`TelemetryConfigSection`] - logging and metrics
//!
//! # Example
//!
//! ```no_run
//! use janus_config::ConfigLoader;
//!
//! # fn main() -> Result<(), janus_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("janus.toml")?
//!     .with_env_prefix("JANUS")
//!     .load()?;
//!
//! println!("serving services from {}", config.registry.location.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [registry]
//! backend = "directory"
//! location = "/etc/janus/services"
//! file_extension = "json"
//! watch = true
//! watch_debounce_ms = 500
//! reload_interval_secs = 120
//! load_failure_policy = "keep_previous"
//!
//! [release]
//! anonymous_id_salt = "change-me"
//! consent_enabled = false
//!
//! [telemetry]
//! service_name = "janus"
//! environment = "production"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9464"
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{JanusConfig, JanusConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    BackendKind, LogFormat, LoggingConfig, MetricsConfig, RegistryConfig, ReleaseConfig,
    TelemetryConfigSection,
};
