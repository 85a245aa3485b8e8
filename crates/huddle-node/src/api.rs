//! HTTP API for the Huddle node.
//!
//! - `POST /room` creates a room and returns its id as plain text
//! - `GET /room/{id}` answers 204 if the room exists, 404 otherwise
//! - `GET /ws/{id}` joins the room over WebSocket (see [`crate::ws`])
//! - `GET /api/stats` reports hub statistics
//! - `GET /metrics` exposes Prometheus metrics

use axum::{
    body::Body,
    extract::{ws::rejection::WebSocketUpgradeRejection, Path, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use huddle_hub::{Hub, HubError, HubStats, RoomInfo};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::health::health_routes;
use crate::observability::{metrics_middleware, request_id_middleware, METRICS};
use crate::ws::ws_handler;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The room hub.
    pub hub: Arc<Hub>,
    /// Largest WebSocket message accepted from a client, in bytes.
    pub max_message_size: usize,
    /// When the node started.
    pub started_at: Instant,
}

impl AppState {
    /// Create state around a hub.
    pub fn new(hub: Arc<Hub>, max_message_size: usize) -> Self {
        Self {
            hub,
            max_message_size,
            started_at: Instant::now(),
        }
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Upgrade(#[from] WebSocketUpgradeRejection),
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::RoomNotFound(id) | HubError::InvalidRoom(id) => ApiError::RoomNotFound(id),
            HubError::ShuttingDown => ApiError::ShuttingDown,
            err @ HubError::AlreadyRegistered(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upgrade(rejection) => rejection.status(),
        };

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Statistics response.
#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub hub: HubStats,
    pub uptime_secs: u64,
    pub rooms: Vec<RoomInfo>,
}

/// CORS policy: any origin, the usual methods, and the two headers browser
/// clients send.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([HeaderName::from_static(
            crate::observability::REQUEST_ID_HEADER,
        )])
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/room", post(create_room))
        .route("/room/{id}", get(get_room))
        .route("/ws/{id}", get(ws_handler))
        .route("/api/stats", get(get_stats))
        .route("/metrics", get(metrics_handler))
        .merge(health_routes())
        .layer(cors_layer())
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Creates a new room.
async fn create_room(State(state): State<AppState>) -> impl IntoResponse {
    let room = state.hub.create_room();
    METRICS.rooms_created.inc();

    (
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "text/plain")],
        room.id.clone(),
    )
}

/// Checks that a room exists.
async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.hub.room(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Hub statistics and room list.
async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        hub: state.hub.stats(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        rooms: state.hub.rooms(),
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    METRICS.refresh_hub(&state.hub.stats());

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )
        .body(Body::from(METRICS.encode()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
