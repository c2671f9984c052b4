// src/storage/pool.rs

use crate::clock::Clock;
use crate::core::{KeyRotationStrategy, RoundRobinStrategy};
use crate::error::KeyError;
use crate::metrics;
use crate::storage::key_state::{preview_key, KeyRecord, KeyStatus};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_BLOCK_DURATION_SECS: i64 = 5 * 60;
/// Longest quarantine a key can be put under.
pub const MAX_BLOCK_DURATION_SECS: i64 = 7 * 24 * 60 * 60;

/// When a key is quarantined and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Consecutive failures that put a key into quarantine.
    pub failure_threshold: u32,
    /// Quarantine length used when a failure report does not carry its own.
    pub block_duration: Duration,
}

impl RotationPolicy {
    /// Threshold raised to at least 1; block duration kept within `1s..=MAX_BLOCK_DURATION_SECS`.
    pub fn normalized(self) -> Self {
        let block_duration = if self.block_duration <= Duration::zero() {
            Duration::seconds(DEFAULT_BLOCK_DURATION_SECS)
        } else {
            self.block_duration.min(Duration::seconds(MAX_BLOCK_DURATION_SECS))
        };
        Self {
            failure_threshold: self.failure_threshold.max(1),
            block_duration,
        }
    }

    /// Block length for one failure report. Non-positive overrides fall back to the policy.
    pub fn block_for(&self, requested: Option<Duration>) -> Duration {
        match requested {
            Some(d) if d > Duration::zero() => d.min(Duration::seconds(MAX_BLOCK_DURATION_SECS)),
            _ => self.block_duration,
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            block_duration: Duration::seconds(DEFAULT_BLOCK_DURATION_SECS),
        }
    }
}

/// Result of a call made with a leased key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// `block_for` overrides the pool's block duration if this failure trips the threshold.
    Failure { block_for: Option<Duration> },
}

/// A credential handed to a caller together with the handle it must report back.
#[derive(Debug)]
pub struct KeyLease {
    service: String,
    index: usize,
    key: Secret<String>,
}

impl KeyLease {
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Handle to pass to `mark_success` / `mark_failure`.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> &Secret<String> {
        &self.key
    }

    pub fn expose(&self) -> &str {
        self.key.expose_secret()
    }

    pub fn preview(&self) -> String {
        preview_key(self.key.expose_secret())
    }
}

/// Snapshot of one service's pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub available: bool,
    pub total_keys: usize,
    pub available_keys: usize,
    pub blocked_keys: usize,
    pub keys: Vec<KeyStatus>,
}

impl ServiceStatus {
    /// Status reported for a service that has no pool.
    pub fn unconfigured(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            available: false,
            total_keys: 0,
            available_keys: 0,
            blocked_keys: 0,
            keys: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct PoolState {
    records: Vec<KeyRecord>,
    cursor: Option<usize>,
}

impl PoolState {
    /// Lifts every block whose window has passed. Runs first in every pool operation.
    fn reconcile(&mut self, service: &str, now: DateTime<Utc>) {
        for record in &mut self.records {
            if record.reconcile(now) {
                info!(
                    service,
                    key.index = record.index(),
                    api_key.preview = %preview_key(record.value().expose_secret()),
                    "API key unblocked after cooldown period"
                );
            }
        }
    }

    fn next_unblock(&self) -> Option<DateTime<Utc>> {
        self.records.iter().filter_map(KeyRecord::blocked_until).min()
    }
}

/// Ordered credentials for one service plus the rotation cursor.
///
/// All state sits behind a single mutex; no operation does I/O while holding it.
#[derive(Debug)]
pub struct KeyPool {
    service: String,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    strategy: Arc<dyn KeyRotationStrategy>,
    state: Mutex<PoolState>,
}

impl KeyPool {
    /// `keys` become records in order; their positions are the handles.
    pub fn new(
        service: impl Into<String>,
        keys: Vec<String>,
        policy: RotationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let records = keys
            .into_iter()
            .enumerate()
            .map(|(index, value)| KeyRecord::new(value, index))
            .collect();

        let service = service.into();
        let normalized = policy.normalized();
        if normalized != policy {
            warn!(
                service = %service,
                requested = ?policy,
                effective = ?normalized,
                "Rotation policy out of range; using clamped values"
            );
        }

        Self {
            service,
            policy: normalized,
            clock,
            strategy: Arc::new(RoundRobinStrategy),
            state: Mutex::new(PoolState {
                records,
                cursor: None,
            }),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn KeyRotationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn select(&self) -> Result<KeyLease, KeyError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.reconcile(&self.service, now);

        if state.records.is_empty() {
            return Err(KeyError::NoKeysConfigured {
                service: self.service.clone(),
            });
        }

        let total = state.records.len();
        let Some(index) = self.strategy.select(&state.records, state.cursor) else {
            let next_available_at = state.next_unblock();
            warn!(
                service = %self.service,
                total_keys = total,
                next_available_at = ?next_available_at,
                "All API keys for service are currently blocked"
            );
            metrics::record_exhausted(&self.service);
            return Err(KeyError::AllKeysBlocked {
                service: self.service.clone(),
                next_available_at,
            });
        };

        state.cursor = Some(index);
        let record = &mut state.records[index];
        record.mark_dispatched(now);
        let key = Secret::new(record.value().expose_secret().clone());

        debug!(
            service = %self.service,
            key.index = index,
            api_key.preview = %preview_key(key.expose_secret()),
            total_keys = total,
            "Selected API key (round-robin)"
        );
        metrics::record_key_selected(&self.service);

        Ok(KeyLease {
            service: self.service.clone(),
            index,
            key,
        })
    }

    pub fn report(&self, index: usize, outcome: Outcome) -> Result<(), KeyError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.reconcile(&self.service, now);

        let pool_size = state.records.len();
        let Some(record) = state.records.get_mut(index) else {
            return Err(KeyError::InvalidKeyHandle {
                service: self.service.clone(),
                index,
                pool_size,
            });
        };

        match outcome {
            Outcome::Success => {
                let was_blocked = !record.is_available();
                record.record_success();
                if was_blocked {
                    info!(
                        service = %self.service,
                        key.index = index,
                        "Late success report lifted an active block"
                    );
                }
                debug!(service = %self.service, key.index = index, "API key marked as successful");
            }
            Outcome::Failure { block_for } => {
                let block_for = self.policy.block_for(block_for);
                let blocked = record.record_failure(now, self.policy.failure_threshold, block_for);
                metrics::record_key_failure(&self.service);

                if blocked {
                    warn!(
                        service = %self.service,
                        key.index = index,
                        api_key.preview = %preview_key(record.value().expose_secret()),
                        failures = record.consecutive_failures(),
                        blocked_until = ?record.blocked_until(),
                        "API key has been blocked"
                    );
                    metrics::record_key_blocked(&self.service);
                } else {
                    warn!(
                        service = %self.service,
                        key.index = index,
                        failures = record.consecutive_failures(),
                        "API key marked as failed"
                    );
                }
            }
        }
        Ok(())
    }

    pub fn mark_success(&self, index: usize) -> Result<(), KeyError> {
        self.report(index, Outcome::Success)
    }

    pub fn mark_failure(&self, index: usize, block_for: Option<Duration>) -> Result<(), KeyError> {
        self.report(index, Outcome::Failure { block_for })
    }

    /// Snapshot of every record. Expired blocks are lifted before counting.
    pub fn status(&self) -> ServiceStatus {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.reconcile(&self.service, now);

        let keys: Vec<KeyStatus> = state.records.iter().map(KeyRecord::status).collect();
        let available_keys = state.records.iter().filter(|r| r.is_available()).count();

        ServiceStatus {
            service: self.service.clone(),
            available: available_keys > 0,
            total_keys: keys.len(),
            available_keys,
            blocked_keys: keys.len() - available_keys,
            keys,
        }
    }

    /// Unblocks every key and clears failure streaks. Lifetime counters survive.
    pub fn reset_all(&self) {
        let mut state = self.state.lock();
        for record in &mut state.records {
            record.reset();
        }
        info!(service = %self.service, keys = state.records.len(), "Reset all keys for service");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::KeyHealth;

    fn pool(keys: &[&str]) -> (KeyPool, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let pool = KeyPool::new(
            "gemini",
            keys.iter().map(|k| k.to_string()).collect(),
            RotationPolicy::default(),
            clock.clone(),
        );
        (pool, clock)
    }

    #[test]
    fn test_empty_pool_reports_no_keys() {
        let (pool, _) = pool(&[]);
        assert!(matches!(
            pool.select(),
            Err(KeyError::NoKeysConfigured { .. })
        ));
    }

    #[test]
    fn test_report_rejects_out_of_range_handle() {
        let (pool, _) = pool(&["a", "b"]);
        assert_eq!(
            pool.mark_success(2),
            Err(KeyError::InvalidKeyHandle {
                service: "gemini".into(),
                index: 2,
                pool_size: 2,
            })
        );
    }

    #[test]
    fn test_per_call_block_duration_overrides_policy() {
        let (pool, clock) = pool(&["a", "b"]);
        let start = clock.now();
        for _ in 0..3 {
            pool.mark_failure(0, Some(Duration::seconds(30))).unwrap();
        }

        let status = pool.status();
        assert_eq!(status.keys[0].blocked_until, Some(start + Duration::seconds(30)));

        clock.advance(Duration::seconds(30));
        assert_eq!(pool.status().keys[0].health, KeyHealth::Available);
    }

    #[test]
    fn test_exhaustion_reports_earliest_unblock() {
        let (pool, clock) = pool(&["a", "b"]);
        let start = clock.now();
        for _ in 0..3 {
            pool.mark_failure(0, Some(Duration::minutes(10))).unwrap();
            pool.mark_failure(1, Some(Duration::minutes(2))).unwrap();
        }

        assert_eq!(
            pool.select().unwrap_err(),
            KeyError::AllKeysBlocked {
                service: "gemini".into(),
                next_available_at: Some(start + Duration::minutes(2)),
            }
        );
    }

    #[test]
    fn test_late_success_lifts_block() {
        let (pool, _) = pool(&["a"]);
        for _ in 0..3 {
            pool.mark_failure(0, None).unwrap();
        }
        assert!(pool.select().is_err());

        pool.mark_success(0).unwrap();
        assert_eq!(pool.select().unwrap().index(), 0);
    }

    #[test]
    fn test_reset_all_unblocks_without_touching_totals() {
        let (pool, _) = pool(&["a", "b"]);
        for _ in 0..3 {
            pool.mark_failure(0, None).unwrap();
            pool.mark_failure(1, None).unwrap();
        }
        assert_eq!(pool.status().blocked_keys, 2);

        pool.reset_all();
        let status = pool.status();
        assert_eq!(status.available_keys, 2);
        assert!(status.keys.iter().all(|k| k.consecutive_failures == 0));
        assert!(status.keys.iter().all(|k| k.cumulative_failures == 3));
    }

    #[test]
    fn test_oversized_override_is_capped() {
        let (pool, clock) = pool(&["a", "b"]);
        let start = clock.now();
        for _ in 0..3 {
            pool.mark_failure(0, Some(Duration::max_value())).unwrap();
        }

        let status = pool.status();
        assert_eq!(status.blocked_keys, 1);
        assert_eq!(
            status.keys[0].blocked_until,
            Some(start + Duration::seconds(MAX_BLOCK_DURATION_SECS))
        );
        assert_eq!(pool.select().unwrap().index(), 1);
    }

    #[test]
    fn test_negative_override_uses_policy_duration() {
        let (pool, clock) = pool(&["a", "b"]);
        let start = clock.now();
        for _ in 0..3 {
            pool.mark_failure(0, Some(Duration::seconds(-60))).unwrap();
        }

        let status = pool.status();
        assert_eq!(status.keys[0].health, KeyHealth::Blocked);
        assert_eq!(
            status.keys[0].blocked_until,
            Some(start + Duration::seconds(DEFAULT_BLOCK_DURATION_SECS))
        );
    }

    #[test]
    fn test_policy_is_normalized_on_construction() {
        let pool = KeyPool::new(
            "gemini",
            vec!["a".to_string()],
            RotationPolicy {
                failure_threshold: 0,
                block_duration: Duration::seconds(-5),
            },
            Arc::new(ManualClock::starting_now()),
        );

        assert_eq!(pool.policy().failure_threshold, 1);
        assert_eq!(
            pool.policy().block_duration,
            Duration::seconds(DEFAULT_BLOCK_DURATION_SECS)
        );
    }
}
