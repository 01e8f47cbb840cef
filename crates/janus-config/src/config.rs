//! Main configuration types.
//!
//! This module provides the top-level [`JanusConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{BackendKind, ConfigError, LogFormat, RegistryConfig, ReleaseConfig, TelemetryConfigSection};

const MAX_WATCH_DEBOUNCE_MS: u64 = 60_000;
const MAX_RELOAD_INTERVAL_SECS: u64 = 86_400;

/// Complete Janus configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use janus_config::JanusConfig;
///
/// let config = JanusConfig::default();
/// assert_eq!(config.registry.file_extension, "json");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct JanusConfig {
    /// Registry persistence and reload settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Attribute release settings.
    #[serde(default)]
    pub release: ReleaseConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl JanusConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> JanusConfigBuilder {
        JanusConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The directory backend has no location
    /// - The file extension is empty or contains a dot
    /// - The debounce window or reload interval is out of range
    /// - The log level is not a valid filter directive
    /// - The metrics address is set but invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        let registry = &self.registry;

        if registry.backend == BackendKind::Directory && registry.location.as_os_str().is_empty() {
            return Err(ConfigError::missing_field("registry.location"));
        }

        if registry.file_extension.is_empty() || registry.file_extension.contains('.') {
            return Err(ConfigError::invalid_value(
                "registry.file_extension",
                format!("must be non-empty and contain no '.': {:?}", registry.file_extension),
            ));
        }

        if registry.watch_debounce_ms > MAX_WATCH_DEBOUNCE_MS {
            return Err(ConfigError::invalid_value(
                "registry.watch_debounce_ms",
                format!("must be at most {MAX_WATCH_DEBOUNCE_MS}"),
            ));
        }

        if registry.reload_interval_secs > MAX_RELOAD_INTERVAL_SECS {
            return Err(ConfigError::invalid_value(
                "registry.reload_interval_secs",
                format!("must be at most {MAX_RELOAD_INTERVAL_SECS} (0 disables)"),
            ));
        }

        if self.telemetry.logging.enabled {
            janus_telemetry::logging::create_env_filter(&self.telemetry.logging.level)
                .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;
        }

        if let Some(addr) = &self.telemetry.metrics.addr {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }

        Ok(())
    }

    /// Development preset.
    ///
    /// - Pretty debug logs with file and line
    /// - Fast watcher debounce
    /// - Partial loads, so one broken definition does not block edits
    ///
    /// # Example
    ///
    /// ```
    /// use janus_config::JanusConfig;
    ///
    /// let config = JanusConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.environment = "development".to_string();

        config.registry.watch_debounce_ms = 100;
        config.registry.load_failure_policy = janus_registry::LoadFailurePolicy::Partial;

        config
    }

    /// Production preset.
    ///
    /// - JSON info logs
    /// - Metrics enabled
    /// - Previous index kept when any definition fails to parse
    ///
    /// # Example
    ///
    /// ```
    /// use janus_config::{JanusConfig, LogFormat};
    ///
    /// let config = JanusConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.environment = "production".to_string();
        config.telemetry.metrics.enabled = true;

        config.registry.load_failure_policy = janus_registry::LoadFailurePolicy::KeepPrevious;

        config
    }
}

/// Builder for [`JanusConfig`].
#[derive(Debug, Default)]
pub struct JanusConfigBuilder {
    registry: Option<RegistryConfig>,
    release: Option<ReleaseConfig>,
    telemetry: Option<TelemetryConfigSection>,
}

impl JanusConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registry configuration.
    #[must_use]
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the release configuration.
    #[must_use]
    pub fn release(mut self, release: ReleaseConfig) -> Self {
        self.release = Some(release);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> JanusConfig {
        JanusConfig {
            registry: self.registry.unwrap_or_default(),
            release: self.release.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<JanusConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
