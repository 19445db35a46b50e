//! Queue endpoint handlers.
//!
//! These handlers only translate HTTP into publisher/poller calls:
//! 1. Extract the queue name (and body or timeout)
//! 2. Call the publisher or poller
//! 3. Map the outcome to a status code and a short text body

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::QueueError;
use crate::queue::{Poller, Publisher};
use crate::Config;

pub const PUBLISHED_TEXT: &str = "Message added to queue successfully.";
pub const NO_MESSAGE_TEXT: &str = "No message in queue.";
pub const UNAVAILABLE_TEXT: &str = "Broker connection unavailable.";
pub const PUBLISH_FAILED_TEXT: &str = "Error adding message to queue.";
pub const CONSUME_FAILED_TEXT: &str = "Error retrieving message from queue.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connection: ConnectionManager,
    pub publisher: Publisher,
    pub poller: Poller,
}

impl AppState {
    pub fn new(config: Config, connection: ConnectionManager) -> Self {
        let publisher = Publisher::new(connection.clone());
        let poller = Poller::with_interval(connection.clone(), config.poll_interval());

        Self {
            config: Arc::new(config),
            connection,
            publisher,
            poller,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker: &'static str,
}

/// Health check endpoint. Reports 503 unless the broker connection is ready.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let broker = state.connection.state().await;

    let (code, status) = match broker {
        ConnectionState::Ready => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            broker: broker.as_str(),
        }),
    )
}

// =============================================================================
// Publish
// =============================================================================

/// Enqueue the JSON request body on `queue_name`.
///
/// Malformed bodies are rejected by the `Json` extractor before this runs.
pub async fn publish_message(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, &'static str) {
    let payload = match serde_json::to_vec(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!(queue = %queue_name, error = %e, "publish_serialize_failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, PUBLISH_FAILED_TEXT);
        }
    };

    info!(
        queue = %queue_name,
        body_length = payload.len(),
        "publish_request_received"
    );

    match state.publisher.publish(&queue_name, &payload).await {
        Ok(()) => (StatusCode::CREATED, PUBLISHED_TEXT),
        Err(QueueError::BrokerUnavailable) => {
            warn!(queue = %queue_name, "publish_broker_unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_TEXT)
        }
        Err(e) => {
            error!(queue = %queue_name, error = %e, "publish_failed");
            (e.status_code(), PUBLISH_FAILED_TEXT)
        }
    }
}

// =============================================================================
// Consume
// =============================================================================

/// Pick the `timeout` query value.
///
/// Pairs are taken raw so non-numeric values fall back to the default
/// instead of being rejected. A repeated `timeout` is ambiguous and is
/// treated like a non-numeric one.
pub fn timeout_param(query: &[(String, String)]) -> Option<&str> {
    let mut values = query
        .iter()
        .filter(|(key, _)| key == "timeout")
        .map(|(_, value)| value.as_str());

    match (values.next(), values.next()) {
        (Some(value), None) => Some(value),
        _ => None,
    }
}

/// Resolve the requested poll timeout in milliseconds.
///
/// Absent, non-numeric, non-finite and zero values use `default`; negative
/// values become zero (a single fetch attempt); fractions are truncated.
pub fn resolve_timeout(raw: Option<&str>, default: Duration) -> Duration {
    let millis = match raw.and_then(|v| v.trim().parse::<f64>().ok()) {
        Some(ms) if ms.is_finite() && ms != 0.0 => ms,
        _ => return default,
    };

    if millis < 0.0 {
        Duration::ZERO
    } else {
        Duration::from_millis(millis as u64)
    }
}

/// Wait up to `timeout` ms for the next message on `queue_name`.
pub async fn consume_message(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let timeout = resolve_timeout(timeout_param(&query), state.config.default_poll_timeout());

    info!(
        queue = %queue_name,
        timeout_ms = timeout.as_millis() as u64,
        "consume_request_received"
    );

    match state.poller.poll_for_message(&queue_name, timeout).await {
        Ok(Some(message)) => (StatusCode::OK, message.text()).into_response(),
        Ok(None) => (StatusCode::NO_CONTENT, NO_MESSAGE_TEXT).into_response(),
        Err(QueueError::BrokerUnavailable) => {
            warn!(queue = %queue_name, "consume_broker_unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_TEXT).into_response()
        }
        Err(e) => {
            error!(queue = %queue_name, error = %e, "consume_failed");
            (e.status_code(), CONSUME_FAILED_TEXT).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::Router;
    use tokio::time::Instant;
    use tower::ServiceExt;

    use super::*;
    use crate::broker::{Broker, InMemoryBroker};
    use crate::web::router;

    async fn test_app() -> (Router, Arc<InMemoryBroker>) {
        let broker = Arc::new(InMemoryBroker::new());
        let connection = ConnectionManager::new();
        let handle = Arc::clone(&broker);
        connection
            .establish(async move { Ok(handle as Arc<dyn Broker>) })
            .await
            .unwrap();
        let app = router(AppState::new(Config::default(), connection));
        (app, broker)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_resolve_timeout() {
        let default = Duration::from_millis(10_000);

        assert_eq!(resolve_timeout(None, default), default);
        assert_eq!(resolve_timeout(Some("abc"), default), default);
        assert_eq!(resolve_timeout(Some(""), default), default);
        assert_eq!(resolve_timeout(Some("0"), default), default);
        assert_eq!(resolve_timeout(Some("NaN"), default), default);
        assert_eq!(resolve_timeout(Some("1000"), default), Duration::from_millis(1000));
        assert_eq!(resolve_timeout(Some(" 300 "), default), Duration::from_millis(300));
        assert_eq!(resolve_timeout(Some("250.9"), default), Duration::from_millis(250));
        assert_eq!(resolve_timeout(Some("-5"), default), Duration::ZERO);
    }

    #[test]
    fn test_timeout_param() {
        fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }

        assert_eq!(timeout_param(&pairs(&[])), None);
        assert_eq!(timeout_param(&pairs(&[("timeout", "300")])), Some("300"));
        assert_eq!(
            timeout_param(&pairs(&[("other", "x"), ("timeout", "300")])),
            Some("300")
        );
        assert_eq!(
            timeout_param(&pairs(&[("timeout", "100"), ("timeout", "200")])),
            None
        );
    }

    #[tokio::test]
    async fn test_health_ready() {
        let (app, _broker) = test_app().await;

        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["broker"], "ready");
    }

    #[tokio::test]
    async fn test_health_unavailable() {
        let app = router(AppState::new(Config::default(), ConnectionManager::new()));

        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["broker"], "uninitialized");
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_then_consume() {
        let (app, _broker) = test_app().await;

        let resp = app
            .clone()
            .oneshot(post_json("/api/orders", r#"{"id":1}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_text(resp).await, PUBLISHED_TEXT);

        let resp = app
            .oneshot(get("/api/orders?timeout=1000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, r#"{"id":1}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_empty_queue_times_out() {
        let (app, _broker) = test_app().await;

        let started = Instant::now();
        let resp = app.oneshot(get("/api/empty?timeout=300")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_non_numeric_timeout_uses_default() {
        let (app, _broker) = test_app().await;

        let started = Instant::now();
        let resp = app.oneshot(get("/api/empty?timeout=soon")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(started.elapsed() >= Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_repeated_timeout_uses_default() {
        let (app, _broker) = test_app().await;

        let started = Instant::now();
        let resp = app
            .oneshot(get("/api/empty?timeout=100&timeout=200"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(started.elapsed() >= Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_publish_malformed_body_rejected() {
        let (app, broker) = test_app().await;

        let resp = app
            .oneshot(post_json("/api/orders", r#"{"id":"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(broker.depth("orders").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_consumers_get_one_message() {
        let (app, _broker) = test_app().await;

        let resp = app
            .clone()
            .oneshot(post_json("/api/orders", r#"{"id":7}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let (a, b) = tokio::join!(
            app.clone().oneshot(get("/api/orders?timeout=5000")),
            app.clone().oneshot(get("/api/orders?timeout=5000")),
        );

        let mut statuses = vec![a.unwrap().status(), b.unwrap().status()];
        statuses.sort();
        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::NO_CONTENT]);
    }

    #[tokio::test]
    async fn test_unavailable_broker_returns_503() {
        let app = router(AppState::new(Config::default(), ConnectionManager::new()));

        let resp = app
            .clone()
            .oneshot(post_json("/api/orders", r#"{"id":1}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(resp).await, UNAVAILABLE_TEXT);

        let resp = app.oneshot(get("/api/orders?timeout=5000")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_dropped_connection_returns_503() {
        let (app, broker) = test_app().await;
        broker.disconnect();

        let resp = app.oneshot(post_json("/api/orders", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_publish_failure_returns_500() {
        let (app, broker) = test_app().await;
        broker.set_fail_on_publish(true);

        let resp = app.oneshot(post_json("/api/orders", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, PUBLISH_FAILED_TEXT);
    }

    #[tokio::test]
    async fn test_declare_conflict_returns_500() {
        let (app, broker) = test_app().await;
        broker.declare_transient("scratch").await;

        let resp = app.oneshot(post_json("/api/scratch", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_500() {
        let (app, broker) = test_app().await;
        broker.set_fail_on_fetch(true);

        let resp = app.oneshot(get("/api/orders?timeout=1000")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, CONSUME_FAILED_TEXT);
    }
}
