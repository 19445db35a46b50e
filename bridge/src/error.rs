//! Error types for broker operations.
//!
//! Every broker-facing operation in the bridge returns [`QueueError`]. The
//! web layer maps each variant to an HTTP status code; the binary treats
//! [`QueueError::Connect`] as fatal at startup.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by the connection manager, publisher and poller.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The shared broker connection is not in the `Ready` state.
    #[error("broker connection unavailable")]
    BrokerUnavailable,

    #[error("failed to connect to broker: {0}")]
    Connect(String),

    /// The queue exists with properties incompatible with a durable declaration.
    #[error("failed to declare queue '{queue}': {message}")]
    QueueDeclare { queue: String, message: String },

    #[error("failed to publish to queue '{queue}': {message}")]
    Publish { queue: String, message: String },

    #[error("failed to fetch from queue '{queue}': {message}")]
    Fetch { queue: String, message: String },
}

/// Returned by [`crate::ConnectionManager::connect`].
pub type ConnectError = QueueError;

/// Returned by [`crate::Publisher::publish`].
pub type PublishError = QueueError;

/// Returned by [`crate::Poller::poll_for_message`].
pub type PollError = QueueError;

pub type Result<T> = std::result::Result<T, QueueError>;

impl QueueError {
    pub(crate) fn declare(queue: &str, err: impl std::fmt::Display) -> Self {
        Self::QueueDeclare {
            queue: queue.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn publish(queue: &str, err: impl std::fmt::Display) -> Self {
        Self::Publish {
            queue: queue.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn fetch(queue: &str, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            queue: queue.to_string(),
            message: err.to_string(),
        }
    }

    /// HTTP status this error surfaces as at the endpoint boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            QueueError::BrokerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
