//! Queue operations exposed over HTTP.
//!
//! This module provides:
//! - An async publisher that declares queues durable and enqueues payloads
//! - A poller that waits a bounded time for the next message on a queue
//!
//! ## Architecture
//!
//! ```text
//! POST /api/{queue} → Publisher → declare + basic.publish → RabbitMQ
//! GET  /api/{queue} → Poller    → declare + basic.get (repeated) → RabbitMQ
//! ```

pub mod poller;
pub mod publisher;

pub use poller::{Poller, DEFAULT_POLL_INTERVAL};
pub use publisher::Publisher;
