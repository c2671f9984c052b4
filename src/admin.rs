// src/admin.rs

use crate::{
    error::Result,
    middleware::admin_auth_middleware,
    monitoring::{summarize, HealthSummary},
    state::AppState,
    storage::ServiceStatus,
};
use axum::{
    extract::{Path, State},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Read-only routes are open; mutating routes require the admin token.
pub fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/admin/keys/:service/reset", post(reset_service_keys))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    Router::new()
        .route("/admin/health", get(admin_health))
        .route("/admin/keys", get(list_all_keys))
        .route("/admin/keys/:service", get(service_keys))
        .merge(protected)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminHealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub total_services: usize,
    pub total_keys: usize,
    pub available_keys: usize,
    pub blocked_keys: usize,
    pub degraded_services: Vec<String>,
    pub unavailable_services: Vec<String>,
}

impl AdminHealthResponse {
    fn new(summary: HealthSummary, uptime_secs: u64) -> Self {
        let status = if summary.is_healthy() {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            uptime_secs,
            total_services: summary.total_services,
            total_keys: summary.total_keys,
            available_keys: summary.available_keys,
            blocked_keys: summary.blocked_keys,
            degraded_services: summary.degraded_services,
            unavailable_services: summary.unavailable_services,
        }
    }
}

async fn admin_health(State(state): State<Arc<AppState>>) -> Json<AdminHealthResponse> {
    let summary = summarize(&state.registry.all_services_status());
    Json(AdminHealthResponse::new(summary, state.uptime().as_secs()))
}

async fn list_all_keys(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, ServiceStatus>> {
    Json(state.registry.all_services_status())
}

async fn service_keys(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Json<ServiceStatus> {
    Json(state.registry.service_status(&service))
}

async fn reset_service_keys(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<ServiceStatus>> {
    state.registry.reset_service(&service)?;
    info!(service = %service, "Keys reset via admin API");
    Ok(Json(state.registry.service_status(&service)))
}
