// src/core/key_rotation.rs

use crate::storage::KeyRecord;
use std::fmt;

/// Picks the next record to dispatch.
///
/// Called with the pool lock held and after expired blocks have been
/// reconciled, so `KeyRecord::is_available` is authoritative.
pub trait KeyRotationStrategy: Send + Sync + fmt::Debug {
    /// `cursor` is the index of the last dispatched record, `None` before the first dispatch.
    fn select(&self, records: &[KeyRecord], cursor: Option<usize>) -> Option<usize>;
}

/// Round-robin that resumes just after the last dispatched key and skips blocked ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinStrategy;

impl KeyRotationStrategy for RoundRobinStrategy {
    fn select(&self, records: &[KeyRecord], cursor: Option<usize>) -> Option<usize> {
        let len = records.len();
        if len == 0 {
            return None;
        }

        let start = cursor.map_or(0, |c| (c + 1) % len);
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| records[idx].is_available())
    }
}
