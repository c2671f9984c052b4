//! Outcomes the key registry reports instead of a key.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a registry operation could not hand out (or account for) a key.
///
/// Every variant names the service it concerns so callers juggling several
/// services can log and branch without extra bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// No pool exists for the service. Permanent until restart with new configuration.
    #[error("Service '{service}' has no configured API keys")]
    ServiceNotConfigured { service: String },

    /// A pool exists but holds no keys.
    #[error("Key pool for service '{service}' is empty")]
    NoKeysConfigured { service: String },

    /// Every key in the pool is quarantined.
    #[error("All API keys for service '{service}' are temporarily blocked")]
    AllKeysBlocked {
        service: String,
        /// Earliest moment one of the blocked keys becomes selectable again.
        next_available_at: Option<DateTime<Utc>>,
    },

    /// A handle that does not belong to the pool. Always a caller bug.
    #[error("Invalid key handle {index} for service '{service}' (pool has {pool_size} keys)")]
    InvalidKeyHandle {
        service: String,
        index: usize,
        pool_size: usize,
    },
}

impl KeyError {
    pub fn service(&self) -> &str {
        match self {
            Self::ServiceNotConfigured { service }
            | Self::NoKeysConfigured { service }
            | Self::AllKeysBlocked { service, .. }
            | Self::InvalidKeyHandle { service, .. } => service,
        }
    }

    /// Only exhaustion clears up on its own; the rest need a config change or a code fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AllKeysBlocked { .. })
    }

    /// `true` when the dependent feature should be treated as switched off.
    pub fn is_unconfigured(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotConfigured { .. } | Self::NoKeysConfigured { .. }
        )
    }
}
