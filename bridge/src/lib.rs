//! Queue Bridge - REST access to RabbitMQ queues.
//!
//! This library provides the modules behind the `queue-bridge` binary:
//! - `connection`: lifecycle of the single shared broker connection
//! - `queue`: durable publishing and bounded long-polling
//! - `web`: axum router mapping HTTP requests onto queue operations
//!
//! ## Architecture
//!
//! ```text
//! HTTP client → Web Server → Publisher / Poller → ConnectionManager → RabbitMQ
//! ```

pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod queue;
pub mod web;

// Re-export commonly used types
pub use broker::{AmqpBroker, Broker, InMemoryBroker, Message};
pub use config::{BrokerKind, Config};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{ConnectError, PollError, PublishError, QueueError};
pub use queue::{Poller, Publisher, DEFAULT_POLL_INTERVAL};
pub use web::{router, AppState};
