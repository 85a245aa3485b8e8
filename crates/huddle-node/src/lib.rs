//! # Huddle Node
//!
//! HTTP and WebSocket front end for the Huddle room relay.
//!
//! The node owns a single [`huddle_hub::Hub`] and exposes it over HTTP:
//! clients create a room with `POST /room`, check it with `GET /room/{id}`,
//! and join it by upgrading `GET /ws/{id}` to a WebSocket. Every message a
//! member sends is relayed verbatim to the other members.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  Huddle Node                  │
//! ├───────────────────────────────────────────────┤
//! │  HTTP layer (axum)                            │
//! │  • CORS, request ids, metrics middleware      │
//! │  • /room, /room/{id}, /ws/{id}                │
//! │  • /metrics, /health, /api/stats              │
//! ├───────────────────────────────────────────────┤
//! │  WebSocket adapter (ws::WsConnection)         │
//! ├───────────────────────────────────────────────┤
//! │  huddle_hub::Hub                              │
//! │  • room registry, client sessions, relay      │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin huddle-node -- --addr 127.0.0.1:8080
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Routes, shared state and error mapping
//! - [`ws`] - WebSocket endpoint and hub connection adapter
//! - [`config`] - Layered node configuration
//! - [`observability`] - Structured logging, metrics, and request tracing
//! - [`health`] - Health check endpoints
//!
//! ## Example: Building the router
//!
//! ```rust,no_run
//! use huddle_hub::Hub;
//! use huddle_node::api::{create_router, AppState};
//! use std::sync::Arc;
//!
//! let hub = Arc::new(Hub::default());
//! let app = create_router(AppState::new(hub, 64 * 1024));
//! ```

pub mod api;
pub mod config;
pub mod health;
pub mod observability;
pub mod ws;
