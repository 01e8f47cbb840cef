//! Prometheus metrics for the service registry.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `janus_registry_reloads_total` | Counter | `outcome` | Registry reloads |
//! | `janus_registry_services` | Gauge | - | Services in the current snapshot |
//! | `janus_registry_lookups_total` | Counter | `result` | Lookups by candidate service URL |
//! | `janus_watcher_events_total` | Counter | `kind` | Handled directory events |
//!
//! Recording functions are safe to call before [`init_metrics`]; without an
//! installed recorder they are no-ops.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Reload counter name.
pub const RELOADS_TOTAL: &str = "janus_registry_reloads_total";
/// Snapshot size gauge name.
pub const SERVICES: &str = "janus_registry_services";
/// Lookup counter name.
pub const LOOKUPS_TOTAL: &str = "janus_registry_lookups_total";
/// Watcher event counter name.
pub const WATCHER_EVENTS_TOTAL: &str = "janus_watcher_events_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address for the scrape endpoint; `None` keeps metrics in-process and
    /// exposes them only through [`render_metrics`].
    pub addr: Option<String>,
}

/// Outcome label for [`record_reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The snapshot was replaced.
    Success,
    /// The load failed and the previous snapshot was kept.
    Failure,
}

impl ReloadOutcome {
    fn as_label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Initializes the metrics subsystem.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` for an unparsable address and
/// `TelemetryError::MetricsInit` if the recorder cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new();
    if let Some(addr) = &config.addr {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| TelemetryError::InvalidConfig(format!("{addr}: {e}")))?;
        builder = builder.with_http_listener(addr);
    }

    let handle = builder
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(RELOADS_TOTAL, "Registry reloads by outcome");
    describe_gauge!(SERVICES, "Registered services in the current snapshot");
    describe_counter!(LOOKUPS_TOTAL, "Service lookups by result");
    describe_counter!(WATCHER_EVENTS_TOTAL, "Service directory events handled by kind");
}

/// Records a registry reload.
pub fn record_reload(outcome: ReloadOutcome) {
    counter!(RELOADS_TOTAL, "outcome" => outcome.as_label()).increment(1);
}

/// Sets the snapshot size gauge.
pub fn set_registry_size(count: usize) {
    gauge!(SERVICES).set(count as f64);
}

/// Records a lookup by candidate service URL.
pub fn record_lookup(matched: bool) {
    let result = if matched { "hit" } else { "miss" };
    counter!(LOOKUPS_TOTAL, "result" => result).increment(1);
}

/// Records a handled watcher event (`created`, `modified`, `deleted`).
pub fn record_watcher_event(kind: &'static str) {
    counter!(WATCHER_EVENTS_TOTAL, "kind" => kind).increment(1);
}
