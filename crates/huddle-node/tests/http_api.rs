//! HTTP route tests for the node API.

use axum::{body::Body, http::Request};
use huddle_hub::Hub;
use huddle_node::api::{create_router, AppState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app() -> (axum::Router, Arc<Hub>) {
    let hub = Arc::new(Hub::default());
    let app = create_router(AppState::new(hub.clone(), 64 * 1024));
    (app, hub)
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create_room(app: &axum::Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/room")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), 201);
    String::from_utf8(body_bytes(response).await).unwrap()
}

// ==================== Room Tests ====================

#[tokio::test]
async fn test_create_room_returns_plain_text_id() {
    let (app, hub) = create_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/room")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["content-type"], "text/plain");

    let id = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(!id.is_empty());
    assert!(hub.get_room(&id).is_some());
}

#[tokio::test]
async fn test_created_room_ids_are_distinct() {
    let (app, _hub) = create_test_app();

    let first = create_room(&app).await;
    let second = create_room(&app).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_get_existing_room() {
    let (app, _hub) = create_test_app();
    let id = create_room(&app).await;

    let response = app.clone().oneshot(get(&format!("/room/{id}"))).await.unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_get_missing_room() {
    let (app, _hub) = create_test_app();

    let response = app.clone().oneshot(get("/room/nonexistent")).await.unwrap();
    assert_eq!(response.status(), 404);

    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("nonexistent"));
}

#[tokio::test]
async fn test_ws_to_missing_room_is_rejected_before_upgrade() {
    let (app, hub) = create_test_app();

    let request = Request::builder()
        .method("GET")
        .uri("/ws/nonexistent")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), 404);
    assert_eq!(hub.stats().total_clients, 0);
}

#[tokio::test]
async fn test_ws_without_upgrade_headers() {
    let (app, _hub) = create_test_app();
    let id = create_room(&app).await;

    let response = app.clone().oneshot(get(&format!("/ws/{id}"))).await.unwrap();
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), 404);
}

// ==================== CORS Tests ====================

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _hub) = create_test_app();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/room")
        .header("origin", "https://example.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");

    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    for method in ["GET", "POST", "PUT", "DELETE", "OPTIONS"] {
        assert!(methods.contains(method), "missing {method}");
    }
    let allowed = headers["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_lowercase();
    assert!(allowed.contains("content-type"));
    assert!(allowed.contains("authorization"));
}

#[tokio::test]
async fn test_cors_header_on_simple_request() {
    let (app, _hub) = create_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/room")
        .header("origin", "https://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

// ==================== Observability Tests ====================

#[tokio::test]
async fn test_request_id_is_generated_and_echoed() {
    let (app, _hub) = create_test_app();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _hub) = create_test_app();
    create_room(&app).await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("huddle_rooms_created_total"));
    assert!(text.contains("huddle_websocket_connections"));
    assert!(text.contains("huddle_http_requests_total"));
}

#[tokio::test]
async fn test_stats_endpoint() {
    let (app, _hub) = create_test_app();
    let id = create_room(&app).await;

    let response = app.clone().oneshot(get("/api/stats")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = json_body(response).await;
    assert_eq!(body["current_rooms"], 1);
    assert_eq!(body["rooms_created"], 1);
    assert_eq!(body["rooms"][0]["id"], id.as_str());
    assert_eq!(body["rooms"][0]["members"], 0);
}

// ==================== Health Tests ====================

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _hub) = create_test_app();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body = json_body(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let response = app.clone().oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), 200);

    let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_not_ready_during_shutdown() {
    let (app, hub) = create_test_app();
    let id = create_room(&app).await;

    assert!(hub.shutdown(std::time::Duration::from_millis(100)).await);

    let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), 503);
    let body = json_body(response).await;
    assert_eq!(body["status"], "down");

    let response = app.clone().oneshot(get(&format!("/ws/{id}"))).await.unwrap();
    assert_eq!(response.status(), 503);
}
