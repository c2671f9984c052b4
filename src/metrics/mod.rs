//! Prometheus metrics for key rotation.
//!
//! Every recorder here compiles to a no-op when the `metrics` feature is off,
//! so call sites never need their own `cfg` guards.

use crate::storage::ServiceStatus;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")]
use once_cell::sync::OnceCell;

#[cfg(feature = "metrics")]
static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder once per process.
///
/// Returns `false` if another recorder was already installed.
pub fn init() -> bool {
    #[cfg(feature = "metrics")]
    {
        PROMETHEUS
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
            .map_err(|e| tracing::warn!(error = %e, "Failed to install Prometheus recorder"))
            .is_ok()
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Prometheus text exposition, or `None` when metrics are disabled or not installed.
pub fn render() -> Option<String> {
    #[cfg(feature = "metrics")]
    {
        PROMETHEUS.get().map(PrometheusHandle::render)
    }
    #[cfg(not(feature = "metrics"))]
    {
        None
    }
}

pub fn record_key_selected(service: &str) {
    #[cfg(feature = "metrics")]
    counter!("key_rotation_selections_total", "service" => service.to_string()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = service;
}

pub fn record_key_failure(service: &str) {
    #[cfg(feature = "metrics")]
    counter!("key_rotation_failures_total", "service" => service.to_string()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = service;
}

pub fn record_key_blocked(service: &str) {
    #[cfg(feature = "metrics")]
    counter!("key_rotation_blocks_total", "service" => service.to_string()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = service;
}

pub fn record_exhausted(service: &str) {
    #[cfg(feature = "metrics")]
    counter!("key_rotation_exhausted_total", "service" => service.to_string()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = service;
}

/// Publishes per-service key counts as gauges.
pub fn update_service_gauges(status: &ServiceStatus) {
    #[cfg(feature = "metrics")]
    {
        let service = status.service.clone();
        gauge!("key_rotation_keys_total", "service" => service.clone()).set(status.total_keys as f64);
        gauge!("key_rotation_keys_available", "service" => service.clone())
            .set(status.available_keys as f64);
        gauge!("key_rotation_keys_blocked", "service" => service).set(status.blocked_keys as f64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = status;
}
