// src/key_manager.rs

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, CredentialSource, EnvCredentialSource};
use crate::core::{KeyRotationStrategy, RoundRobinStrategy};
use crate::error::KeyError;
use crate::storage::{KeyLease, KeyPool, RotationPolicy, ServiceStatus};
use chrono::Duration;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

/// Read-only view of key health, for dashboards and the health monitor.
pub trait KeyStatusProvider: Send + Sync {
    fn service_status(&self, service: &str) -> ServiceStatus;
    fn all_services_status(&self) -> BTreeMap<String, ServiceStatus>;
}

/// Directory of key pools, one per configured service.
///
/// The map is fixed once built; each pool carries its own lock, so traffic on
/// one service never waits on another.
#[derive(Debug)]
pub struct KeyRegistry {
    pools: BTreeMap<String, KeyPool>,
    policy: RotationPolicy,
}

impl KeyRegistry {
    pub fn builder() -> KeyRegistryBuilder {
        KeyRegistryBuilder::default()
    }

    /// Loads every configured service from the process environment and config file.
    pub fn from_config(config: &AppConfig) -> Self {
        let source = EnvCredentialSource::from_config(config);
        Self::builder()
            .policy(config.rotation.policy())
            .load_from(&source)
            .build()
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Names of services that have a pool.
    pub fn services(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }

    pub fn is_configured(&self, service: &str) -> bool {
        self.pools.contains_key(service)
    }

    fn pool(&self, service: &str) -> Result<&KeyPool, KeyError> {
        self.pools.get(service).ok_or_else(|| KeyError::ServiceNotConfigured {
            service: service.to_string(),
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn get_key(&self, service: &str) -> Result<KeyLease, KeyError> {
        self.pool(service)?.select()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn mark_success(&self, service: &str, index: usize) -> Result<(), KeyError> {
        self.pool(service)?
            .mark_success(index)
            .map_err(log_invalid_handle)
    }

    /// `block_for` overrides the registry's block duration if this failure trips the threshold.
    #[instrument(level = "debug", skip(self))]
    pub fn mark_failure(
        &self,
        service: &str,
        index: usize,
        block_for: Option<Duration>,
    ) -> Result<(), KeyError> {
        self.pool(service)?
            .mark_failure(index, block_for)
            .map_err(log_invalid_handle)
    }

    /// Unknown services report zero keys rather than an error.
    pub fn service_status(&self, service: &str) -> ServiceStatus {
        self.pools
            .get(service)
            .map_or_else(|| ServiceStatus::unconfigured(service), KeyPool::status)
    }

    pub fn all_services_status(&self) -> BTreeMap<String, ServiceStatus> {
        self.pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.status()))
            .collect()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn reset_service(&self, service: &str) -> Result<(), KeyError> {
        self.pool(service)?.reset_all();
        Ok(())
    }

    /// Leases a key, runs `call` with it, and reports the outcome exactly once.
    ///
    /// `Ok` counts as success and `Err` as failure. Nothing is retried; a blocked
    /// or unconfigured service surfaces as `ExecuteError::Key` without calling `call`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        service: &str,
        call: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce(KeyLease) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let lease = self.get_key(service)?;
        let index = lease.index();

        match call(lease).await {
            Ok(value) => {
                self.mark_success(service, index)?;
                Ok(value)
            }
            Err(err) => {
                self.mark_failure(service, index, None)?;
                Err(ExecuteError::Call(err))
            }
        }
    }
}

impl KeyStatusProvider for KeyRegistry {
    fn service_status(&self, service: &str) -> ServiceStatus {
        KeyRegistry::service_status(self, service)
    }

    fn all_services_status(&self) -> BTreeMap<String, ServiceStatus> {
        KeyRegistry::all_services_status(self)
    }
}

fn log_invalid_handle(err: KeyError) -> KeyError {
    if let KeyError::InvalidKeyHandle {
        service,
        index,
        pool_size,
    } = &err
    {
        error!(
            service = %service,
            key.index = index,
            pool_size = pool_size,
            "Outcome reported with an invalid key handle; this is a caller bug"
        );
    }
    err
}

/// Failure of `KeyRegistry::execute`.
#[derive(Error, Debug)]
pub enum ExecuteError<E> {
    /// No key could be leased, so the call was never made.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The call ran and failed; the key has been charged with a failure.
    #[error("Call with leased key failed: {0}")]
    Call(E),
}

pub struct KeyRegistryBuilder {
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    strategy: Arc<dyn KeyRotationStrategy>,
    candidates: Vec<(String, Vec<String>)>,
}

impl Default for KeyRegistryBuilder {
    fn default() -> Self {
        Self {
            policy: RotationPolicy::default(),
            clock: Arc::new(SystemClock),
            strategy: Arc::new(RoundRobinStrategy),
            candidates: Vec::new(),
        }
    }
}

impl KeyRegistryBuilder {
    pub fn policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.policy.failure_threshold = threshold;
        self
    }

    pub fn block_duration(mut self, duration: Duration) -> Self {
        self.policy.block_duration = duration;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn KeyRotationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Adds candidates for `service`. Repeated calls append to the same pool.
    pub fn service<I, S>(mut self, service: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let service = service.into();
        let keys = keys.into_iter().map(Into::into);
        match self.candidates.iter_mut().find(|(name, _)| *name == service) {
            Some((_, existing)) => existing.extend(keys),
            None => self.candidates.push((service, keys.collect())),
        }
        self
    }

    /// Adds every service the source knows about.
    pub fn load_from<S: CredentialSource + ?Sized>(mut self, source: &S) -> Self {
        for service in source.services() {
            let keys = source.load(&service);
            self = self.service(service, keys);
        }
        self
    }

    /// Out-of-range policy values are clamped, see `RotationPolicy::normalized`.
    pub fn build(self) -> KeyRegistry {
        let policy = self.policy.normalized();
        let mut pools = BTreeMap::new();

        for (service, candidates) in self.candidates {
            let submitted = candidates.len();
            let keys = dedup_preserving_order(candidates);

            if keys.is_empty() {
                info!(service = %service, "No API keys found; service will be reported as not configured");
                continue;
            }

            info!(
                service = %service,
                keys = keys.len(),
                duplicates_dropped = submitted - keys.len(),
                "Registered API keys for service"
            );
            let pool = KeyPool::new(service.clone(), keys, policy, self.clock.clone())
                .with_strategy(self.strategy.clone());
            pools.insert(service, pool);
        }

        KeyRegistry { pools, policy }
    }
}

/// Drops exact duplicates, keeping the first occurrence of each value.
pub fn dedup_preserving_order(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|key| !key.is_empty())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
