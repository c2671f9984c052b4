//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::Duration;
use key_rotation_manager::{KeyRegistry, ManualClock};
use std::sync::Arc;

pub const BLOCK_SECS: i64 = 300;

/// Registry over a manual clock with the default threshold of 3 and a 5 minute block.
pub struct TestRegistry {
    pub registry: Arc<KeyRegistry>,
    pub clock: Arc<ManualClock>,
}

impl TestRegistry {
    pub fn with_services(services: &[(&str, &[&str])]) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let mut builder = KeyRegistry::builder()
            .failure_threshold(3)
            .block_duration(Duration::seconds(BLOCK_SECS))
            .clock(clock.clone());
        for (service, keys) in services {
            builder = builder.service(*service, keys.iter().copied());
        }
        Self {
            registry: Arc::new(builder.build()),
            clock,
        }
    }

    pub fn single(service: &str, keys: &[&str]) -> Self {
        Self::with_services(&[(service, keys)])
    }

    /// Leases a key and returns its value.
    pub fn next(&self, service: &str) -> String {
        self.registry
            .get_key(service)
            .expect("key should be available")
            .expose()
            .to_string()
    }

    /// Leases the key at the cursor and reports `n` failures against it.
    pub fn fail_next(&self, service: &str, n: usize) -> usize {
        let lease = self.registry.get_key(service).expect("key should be available");
        for _ in 0..n {
            self.registry
                .mark_failure(service, lease.index(), None)
                .expect("valid handle");
        }
        lease.index()
    }

    pub fn advance_past_block(&self) {
        self.clock.advance(Duration::seconds(BLOCK_SECS + 1));
    }
}

pub fn numbered_keys(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}-{i:04}")).collect()
}
