// src/config/credentials.rs

//! Where raw credentials come from.
//!
//! A source only lists candidates in precedence order. Deduplication and
//! pool construction belong to the registry.

use crate::config::{AppConfig, ServiceConfig};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tracing::debug;

/// Supplies raw credential strings per service.
pub trait CredentialSource {
    /// Service names this source knows about, in configuration order.
    fn services(&self) -> Vec<String>;

    /// Candidates for `service` in precedence order. Unknown services yield nothing.
    fn load(&self, service: &str) -> Vec<String>;
}

type VarLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `PREFIX`, then `PREFIX_1`, `PREFIX_2`, ... for each configured prefix.
///
/// Numbered lookups stop at the first missing number. Blank values count as missing.
#[derive(Clone)]
pub struct EnvCredentialSource {
    services: Vec<ServiceConfig>,
    lookup: VarLookup,
}

impl EnvCredentialSource {
    /// Reads from the process environment.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_lookup(config.services.clone(), |name| env::var(name).ok())
    }

    /// Reads through `lookup` instead of the process environment.
    pub fn with_lookup<F>(services: Vec<ServiceConfig>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            services,
            lookup: Arc::new(lookup),
        }
    }

    /// Convenience for tests: variables come from a fixed map.
    pub fn from_vars(services: Vec<ServiceConfig>, vars: HashMap<String, String>) -> Self {
        Self::with_lookup(services, move |name| vars.get(name).cloned())
    }
}

impl std::fmt::Debug for EnvCredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentialSource")
            .field("services", &self.service_names())
            .finish_non_exhaustive()
    }
}

impl EnvCredentialSource {
    fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}

impl CredentialSource for EnvCredentialSource {
    fn services(&self) -> Vec<String> {
        self.service_names()
    }

    fn load(&self, service: &str) -> Vec<String> {
        let Some(config) = self.services.iter().find(|s| s.name == service) else {
            return Vec::new();
        };

        let mut keys = Vec::new();
        for prefix in &config.env {
            let found = numbered_credentials(prefix, self.lookup.as_ref());
            debug!(service, env.prefix = %prefix, count = found.len(), "Read API keys from environment");
            keys.extend(found);
        }
        keys.extend(
            config
                .api_keys
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        );
        keys
    }
}

/// `prefix` itself, then `prefix_1`, `prefix_2`, ... until the first gap.
pub fn numbered_credentials(prefix: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Vec<String> {
    let read = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut keys = Vec::new();
    if let Some(base) = read(prefix) {
        keys.push(base);
    }

    let mut n = 1usize;
    while let Some(key) = read(&format!("{prefix}_{n}")) {
        keys.push(key);
        n += 1;
    }
    keys
}

/// Fixed service → keys table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    entries: Vec<(String, Vec<String>)>,
}

impl StaticCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service<I, S>(mut self, service: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let service = service.into();
        let keys = keys.into_iter().map(Into::into);
        match self.entries.iter_mut().find(|(name, _)| *name == service) {
            Some((_, existing)) => existing.extend(keys),
            None => self.entries.push((service, keys.collect())),
        }
        self
    }
}

impl CredentialSource for StaticCredentialSource {
    fn services(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn load(&self, service: &str) -> Vec<String> {
        self.entries
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, keys)| keys.clone())
            .unwrap_or_default()
    }
}
