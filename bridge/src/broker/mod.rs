//! Broker capability used by the publisher and poller.
//!
//! The bridge needs only four things from a broker: declare a durable queue,
//! publish bytes to it, fetch one message without waiting, and report whether
//! the transport is still up. [`Broker`] captures that set so the same
//! publisher and poller run against RabbitMQ in production and an in-process
//! broker in tests.

pub mod amqp;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use amqp::AmqpBroker;
pub use memory::InMemoryBroker;

/// A message handed back by a non-blocking fetch.
///
/// The content is the raw payload as published; the bridge never decodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: Vec<u8>,
}

impl Message {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Content as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare `queue` as durable. Idempotent for an existing durable queue.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Publish `payload` to `queue` through the default exchange.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// Fetch at most one message from `queue` with no-ack semantics.
    ///
    /// Returns immediately with `None` when the queue is empty. A returned
    /// message has already been removed from the queue.
    async fn fetch_once(&self, queue: &str) -> Result<Option<Message>>;

    /// Whether the underlying transport is still open.
    fn is_connected(&self) -> bool;

    async fn close(&self);
}
