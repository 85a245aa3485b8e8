//! # Health Check Module
//!
//! - **Liveness Probe** (`/health/live`): is the process running?
//! - **Readiness Probe** (`/health/ready`): is the node admitting clients?
//! - **Summary** (`/health`): version and uptime

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::AppState;

/// Health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Up,
    /// Component is unhealthy.
    Down,
}

/// Overall health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Crate version.
    pub version: &'static str,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Registered rooms.
    pub rooms: usize,
    /// Joined clients.
    pub clients: usize,
}

/// Create the health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Up,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}

async fn readiness(State(state): State<AppState>) -> Response {
    let (status, code) = if state.hub.is_shutting_down() {
        (HealthStatus::Down, StatusCode::SERVICE_UNAVAILABLE)
    } else {
        (HealthStatus::Up, StatusCode::OK)
    };

    let body = ReadinessResponse {
        status,
        rooms: state.hub.room_count(),
        clients: state.hub.client_count(),
    };
    (code, Json(body)).into_response()
}
