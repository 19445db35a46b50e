//! Publishes payloads to named durable queues.

use tracing::info;

use crate::connection::ConnectionManager;
use crate::error::PublishError;

/// Enqueues messages through the shared broker connection.
///
/// Cheap to clone; every clone shares the same [`ConnectionManager`].
#[derive(Clone)]
pub struct Publisher {
    connection: ConnectionManager,
}

impl Publisher {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Declare `queue` as durable, then publish `payload` to it.
    ///
    /// Fails with `BrokerUnavailable` before any I/O when the connection is
    /// not ready. Failures are not retried.
    pub async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), PublishError> {
        let broker = self.connection.broker().await?;

        broker.declare_queue(queue).await?;
        broker.publish(queue, payload).await?;

        info!(
            queue = %queue,
            body_length = payload.len(),
            "rabbitmq_message_published"
        );

        Ok(())
    }
}
