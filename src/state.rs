// src/state.rs

use crate::config::AppConfig;
use crate::key_manager::KeyRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Shared state handed to every Axum handler.
#[derive(Debug)]
pub struct AppState {
    pub registry: Arc<KeyRegistry>,
    pub config: AppConfig,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, registry: Arc<KeyRegistry>) -> Self {
        info!(
            services = ?registry.services(),
            "Application state initialized"
        );
        Self {
            registry,
            config,
            started_at: Instant::now(),
        }
    }

    /// Builds the registry from the process environment and the config's inline keys.
    pub fn from_config(config: AppConfig) -> Self {
        let registry = Arc::new(KeyRegistry::from_config(&config));
        Self::new(config, registry)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
