// src/monitoring/mod.rs

pub mod key_health;

pub use key_health::KeyHealthMonitor;

use crate::storage::ServiceStatus;
use serde::Serialize;
use std::collections::BTreeMap;

/// Fleet-wide rollup of key availability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total_services: usize,
    pub total_keys: usize,
    pub available_keys: usize,
    pub blocked_keys: usize,
    /// Services with at least one blocked key.
    pub degraded_services: Vec<String>,
    /// Services where every key is blocked.
    pub unavailable_services: Vec<String>,
}

impl HealthSummary {
    pub fn is_healthy(&self) -> bool {
        self.blocked_keys == 0
    }
}

pub fn summarize(statuses: &BTreeMap<String, ServiceStatus>) -> HealthSummary {
    let mut summary = HealthSummary {
        total_services: statuses.len(),
        ..HealthSummary::default()
    };

    for (name, status) in statuses {
        summary.total_keys += status.total_keys;
        summary.available_keys += status.available_keys;
        summary.blocked_keys += status.blocked_keys;

        if status.blocked_keys > 0 {
            summary.degraded_services.push(name.clone());
        }
        if status.total_keys > 0 && !status.available {
            summary.unavailable_services.push(name.clone());
        }
    }

    summary
}
