// src/lib.rs

pub mod admin;
pub mod cli;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod key_manager;
pub mod metrics;
pub mod middleware;
pub mod monitoring;
pub mod state;
pub mod storage;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use monitoring::KeyHealthMonitor;
use serde_json::json;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{AppError, KeyError, Result};
pub use key_manager::{ExecuteError, KeyRegistry, KeyRegistryBuilder, KeyStatusProvider};
pub use state::AppState;
pub use storage::{KeyLease, KeyStatus, Outcome, RotationPolicy, ServiceStatus};

/// Builds the introspection router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .merge(admin::admin_routes(state.clone()))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::trace_requests))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

/// CLI flag, then `CONFIG_PATH`, then `config.yaml`.
pub fn resolve_config_path(config_path_override: Option<PathBuf>) -> PathBuf {
    config_path_override.unwrap_or_else(|| {
        std::env::var("CONFIG_PATH").map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    })
}

/// Loads configuration, builds the registry, starts the health monitor and returns the router.
pub async fn run(config_path_override: Option<PathBuf>) -> Result<(Router, AppConfig)> {
    info!("Starting key rotation manager...");

    let app_config = setup_configuration(config_path_override)?;

    if metrics::init() {
        info!("Prometheus metrics recorder installed");
    }

    let state = Arc::new(AppState::from_config(app_config.clone()));

    let monitor = KeyHealthMonitor::new(
        state.registry.clone(),
        Duration::from_secs(app_config.rotation.health_log_interval_secs),
    );
    let _health_task = monitor.start_monitoring();

    Ok((create_router(state), app_config))
}

fn setup_configuration(config_path_override: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = resolve_config_path(config_path_override);
    let config_path_display = config_path.display().to_string();

    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    info!(
        config.path = %config_path_display,
        config.services = ?app_config.service_names(),
        rotation.failure_threshold = app_config.rotation.failure_threshold,
        rotation.block_duration_secs = app_config.rotation.block_duration_secs,
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully."
    );
    Ok(app_config)
}
