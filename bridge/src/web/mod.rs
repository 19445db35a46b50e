//! Web server module exposing queues over HTTP.
//!
//! This module provides a thin web server that:
//! - Enqueues JSON bodies with `POST /api/{queue}`
//! - Long-polls for the next message with `GET /api/{queue}?timeout={ms}`
//! - Reports broker connection health on `GET /health`

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    consume_message, health, publish_message, resolve_timeout, timeout_param, AppState,
    HealthResponse,
};

/// Build the bridge router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/:queue_name", post(publish_message).get(consume_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
