//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::path::PathBuf;
use std::time::Duration;

use janus_registry::LoadFailurePolicy;
use serde::{Deserialize, Serialize};

/// Persistence backend for the registry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// One JSON file per service in a directory.
    #[default]
    Directory,
    /// Process-local store, empty at start.
    Memory,
}

/// Registry configuration section.
///
/// # Example
///
/// ```
/// use janus_config::{BackendKind, RegistryConfig};
///
/// let config = RegistryConfig {
///     backend: BackendKind::Memory,
///     ..Default::default()
/// };
/// assert!(config.reload_interval().is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Persistence backend.
    #[serde(default)]
    pub backend: BackendKind,

    /// Service definition directory for the directory backend.
    #[serde(default = "default_location")]
    pub location: PathBuf,

    /// Service definition file extension, without the dot.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Watch the directory and apply changes live.
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Window over which file events are coalesced.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Interval of the periodic full reload. 0 disables it.
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,

    /// What a directory scan does when some definitions fail to parse.
    #[serde(default)]
    pub load_failure_policy: LoadFailurePolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            location: default_location(),
            file_extension: default_file_extension(),
            watch: true,
            watch_debounce_ms: default_watch_debounce_ms(),
            reload_interval_secs: default_reload_interval_secs(),
            load_failure_policy: LoadFailurePolicy::default(),
        }
    }
}

impl RegistryConfig {
    /// The watcher debounce window.
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// The periodic reload interval, or `None` if disabled.
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}

fn default_location() -> PathBuf {
    PathBuf::from("/etc/janus/services")
}

fn default_file_extension() -> String {
    janus_registry::DEFAULT_EXTENSION.to_string()
}

fn default_watch_debounce_ms() -> u64 {
    500
}

fn default_reload_interval_secs() -> u64 {
    120
}

/// Attribute release configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Salt mixed into pseudonymous identifiers for anonymous services.
    #[serde(default = "default_anonymous_id_salt")]
    pub anonymous_id_salt: String,

    /// Track attribute release consent.
    #[serde(default)]
    pub consent_enabled: bool,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            anonymous_id_salt: default_anonymous_id_salt(),
            consent_enabled: false,
        }
    }
}

fn default_anonymous_id_salt() -> String {
    "change-me".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON output (production).
    #[default]
    Json,
    /// Human-readable output (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g. "info" or "janus_registry=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include file and line in log lines.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics collection.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus scrape endpoint address. Unset keeps metrics in-process.
    #[serde(default)]
    pub addr: Option<String>,
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name attached to startup logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl TelemetryConfigSection {
    /// Convert to the settings consumed by `janus-telemetry`.
    pub fn to_telemetry_config(&self) -> janus_telemetry::TelemetryConfig {
        janus_telemetry::TelemetryConfig {
            logging: janus_telemetry::LogConfig {
                enabled: self.logging.enabled,
                level: self.logging.level.clone(),
                json_format: self.logging.format == LogFormat::Json,
                file_line_info: self.logging.include_location,
                ..janus_telemetry::LogConfig::default()
            },
            metrics: janus_telemetry::MetricsConfig {
                enabled: self.metrics.enabled,
                addr: self.metrics.addr.clone(),
            },
        }
    }
}

fn default_service_name() -> String {
    "janus".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.backend, BackendKind::Directory);
        assert_eq!(config.file_extension, "json");
        assert!(config.watch);
        assert_eq!(config.watch_debounce(), Duration::from_millis(500));
        assert_eq!(config.reload_interval(), Some(Duration::from_secs(120)));
        assert_eq!(config.load_failure_policy, LoadFailurePolicy::KeepPrevious);
    }

    #[test]
    fn test_reload_interval_zero_disables() {
        let config = RegistryConfig {
            reload_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.reload_interval().is_none());
    }

    #[test]
    fn test_registry_unknown_field_rejected() {
        let result: Result<RegistryConfig, _> = toml::from_str("locaton = \"/srv\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_and_policy_names() {
        let config: RegistryConfig =
            toml::from_str("backend = \"memory\"\nload_failure_policy = \"partial\"").unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.load_failure_policy, LoadFailurePolicy::Partial);
    }

    #[test]
    fn test_to_telemetry_config() {
        let section = TelemetryConfigSection {
            logging: LoggingConfig {
                format: LogFormat::Pretty,
                include_location: true,
                ..Default::default()
            },
            metrics: MetricsConfig {
                enabled: true,
                addr: Some("127.0.0.1:9464".to_string()),
            },
            ..Default::default()
        };
        let telemetry = section.to_telemetry_config();
        assert!(!telemetry.logging.json_format);
        assert!(telemetry.logging.file_line_info);
        assert!(telemetry.metrics.enabled);
        assert_eq!(telemetry.metrics.addr.as_deref(), Some("127.0.0.1:9464"));
    }
}
