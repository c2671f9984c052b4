// src/storage/key_state.rs

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// Whether a key may currently be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyHealth {
    Available,
    Blocked,
}

/// Health state of a single credential inside a pool.
///
/// Owned by exactly one `KeyPool` and only ever mutated under that pool's lock.
#[derive(Debug)]
pub struct KeyRecord {
    value: Secret<String>,
    index: usize,
    consecutive_failures: u32,
    cumulative_successes: u64,
    cumulative_failures: u64,
    blocked_until: Option<DateTime<Utc>>,
    last_used: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn new(value: String, index: usize) -> Self {
        Self {
            value: Secret::new(value),
            index,
            consecutive_failures: 0,
            cumulative_successes: 0,
            cumulative_failures: 0,
            blocked_until: None,
            last_used: None,
            last_failure: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> &Secret<String> {
        &self.value
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.blocked_until
    }

    /// Clears an expired block. Returns `true` if this call lifted it.
    ///
    /// Idempotent: a second call with the same `now` is a no-op.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> bool {
        match self.blocked_until {
            Some(until) if now >= until => {
                self.blocked_until = None;
                self.consecutive_failures = 0;
                true
            }
            _ => false,
        }
    }

    /// Availability as of the last `reconcile`.
    pub fn is_available(&self) -> bool {
        self.blocked_until.is_none()
    }

    pub fn health(&self) -> KeyHealth {
        if self.is_available() {
            KeyHealth::Available
        } else {
            KeyHealth::Blocked
        }
    }

    pub fn mark_dispatched(&mut self, now: DateTime<Utc>) {
        self.last_used = Some(now);
    }

    pub fn record_success(&mut self) {
        self.cumulative_successes += 1;
        self.consecutive_failures = 0;
        self.blocked_until = None;
    }

    /// Counts a failure and blocks the key once the streak reaches `threshold`.
    ///
    /// Returns `true` when the key is blocked as a result of this call.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        threshold: u32,
        block_for: Duration,
    ) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.cumulative_failures += 1;
        self.last_failure = Some(now);

        if self.consecutive_failures >= threshold {
            let until = now
                .checked_add_signed(block_for)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.blocked_until = Some(until);
            true
        } else {
            false
        }
    }

    /// Administrative unblock. Lifetime counters are kept.
    pub fn reset(&mut self) {
        self.blocked_until = None;
        self.consecutive_failures = 0;
    }

    /// Lifetime success ratio in `0.0..=1.0`, or `None` before any report.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.cumulative_successes + self.cumulative_failures;
        if total == 0 {
            None
        } else {
            Some(self.cumulative_successes as f64 / total as f64)
        }
    }

    pub fn status(&self) -> KeyStatus {
        KeyStatus {
            index: self.index,
            key_preview: preview_key(self.value.expose_secret()),
            health: self.health(),
            consecutive_failures: self.consecutive_failures,
            cumulative_successes: self.cumulative_successes,
            cumulative_failures: self.cumulative_failures,
            total_requests: self.cumulative_successes + self.cumulative_failures,
            success_rate: self.success_rate(),
            blocked_until: self.blocked_until,
            last_used: self.last_used,
            last_failure: self.last_failure,
        }
    }
}

/// Point-in-time view of one key, safe to hand to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStatus {
    pub index: usize,
    pub key_preview: String,
    pub health: KeyHealth,
    pub consecutive_failures: u32,
    pub cumulative_successes: u64,
    pub cumulative_failures: u64,
    pub total_requests: u64,
    pub success_rate: Option<f64>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

/// Masks a credential down to its first and last four characters.
pub fn preview_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "*".repeat(chars.len())
    }
}
