//! # Observability Module
//!
//! Structured logging, Prometheus metrics and request tracing for the node:
//!
//! - **Structured Logging**: pretty or JSON logs with request IDs and context
//! - **Prometheus Metrics**: HTTP, WebSocket session and relay metrics
//! - **Request Tracing**: `x-request-id` propagation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use huddle_node::observability::{init_logging, request_id_middleware, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let app: Router<()> = Router::new()
//!     .layer(axum::middleware::from_fn(request_id_middleware));
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use metrics::{MetricsState, METRICS};
pub use middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
