//! Operational endpoints.
//!
//! # Endpoints
//! ```text
//! GET /health   → liveness record, 200 once Running (also while draining), 503 before
//! GET /metrics  → Prometheus text exposition
//! ```
//!
//! # Design Decisions
//! - Health reports lifecycle state only; storage reachability is a startup
//!   concern and does not flip the probe
//! - `/health` bypasses policy stages but is still logged and counted
//! - Both handlers are mounted outside the business router's prefix

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::http::server::AppState;
use crate::lifecycle::LifecycleState;
use crate::observability::metrics::EXPOSITION_CONTENT_TYPE;

pub const HEALTH_PATH: &str = "/health";
pub const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub environment: &'static str,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (code, status) = match state.lifecycle.current() {
        LifecycleState::Running => (StatusCode::OK, "healthy"),
        LifecycleState::Stopping => (StatusCode::OK, "stopping"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };
    let body = HealthStatus {
        status,
        service: state.settings.project_name.clone(),
        version: state.settings.version.clone(),
        environment: state.settings.environment.as_str(),
    };
    (code, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.metrics.render(),
    )
}
