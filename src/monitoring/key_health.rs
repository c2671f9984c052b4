// src/monitoring/key_health.rs

use super::{summarize, HealthSummary};
use crate::key_manager::KeyStatusProvider;
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Periodically logs key health and refreshes the availability gauges.
#[derive(Clone)]
pub struct KeyHealthMonitor {
    provider: Arc<dyn KeyStatusProvider>,
    check_interval: Duration,
}

impl KeyHealthMonitor {
    pub fn new(provider: Arc<dyn KeyStatusProvider>, check_interval: Duration) -> Self {
        Self {
            provider,
            check_interval,
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Spawns the background loop. The first check runs immediately.
    pub fn start_monitoring(&self) -> JoinHandle<()> {
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(monitor.check_interval);
            loop {
                ticker.tick().await;
                monitor.check_once();
            }
        });

        info!(
            interval_secs = self.check_interval.as_secs(),
            "Key health monitoring started"
        );
        handle
    }

    /// One pass over every service. Status reads also lift expired blocks.
    pub fn check_once(&self) -> HealthSummary {
        debug!("Performing key health check");

        let statuses = self.provider.all_services_status();
        for status in statuses.values() {
            metrics::update_service_gauges(status);

            if status.total_keys > 0 && !status.available {
                let next_unblock = status.keys.iter().filter_map(|k| k.blocked_until).min();
                warn!(
                    service = %status.service,
                    blocked_keys = status.blocked_keys,
                    next_unblock = ?next_unblock,
                    "All API keys for service are blocked"
                );
            } else if status.blocked_keys > 0 {
                warn!(
                    service = %status.service,
                    available_keys = status.available_keys,
                    blocked_keys = status.blocked_keys,
                    "Service is running with blocked API keys"
                );
            }
        }

        let summary = summarize(&statuses);
        if summary.is_healthy() {
            debug!(
                total_services = summary.total_services,
                total_keys = summary.total_keys,
                "All keys are healthy"
            );
        } else {
            warn!(
                total_keys = summary.total_keys,
                available_keys = summary.available_keys,
                blocked_keys = summary.blocked_keys,
                "Key health check completed with blocked keys"
            );
        }
        summary
    }
}
