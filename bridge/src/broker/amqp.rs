//! RabbitMQ broker backed by lapin.
//!
//! A single connection and a single channel are shared by every request. The
//! channel sits behind a mutex so broker operations are issued one at a time;
//! callers hold the lock only for the AMQP round-trip, never while waiting
//! between poll attempts.

use async_trait::async_trait;
use lapin::{
    options::{BasicGetOptions, BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use super::{Broker, Message};
use crate::error::{QueueError, Result};

pub struct AmqpBroker {
    connection: Connection,
    channel: Mutex<Channel>,
}

impl AmqpBroker {
    /// Open a connection and a channel to the broker at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url_length = url.len(), "rabbitmq_connecting");

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;

        info!("rabbitmq_connected");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::Connect(format!("failed to create channel: {}", e)))?;

        info!(channel_id = channel.id(), "rabbitmq_channel_created");

        Ok(Self {
            connection,
            channel: Mutex::new(channel),
        })
    }

    /// Lock the shared channel, reopening it if the broker closed it.
    ///
    /// The broker closes a channel after a channel-level error such as a
    /// durability mismatch on declare. A closed connection is not reopened.
    async fn channel(&self) -> Result<MutexGuard<'_, Channel>> {
        let mut channel = self.channel.lock().await;

        if channel.status().connected() {
            return Ok(channel);
        }

        if !self.connection.status().connected() {
            return Err(QueueError::BrokerUnavailable);
        }

        warn!(channel_id = channel.id(), "rabbitmq_channel_closed_reopening");

        *channel = self
            .connection
            .create_channel()
            .await
            .map_err(|_| QueueError::BrokerUnavailable)?;

        info!(channel_id = channel.id(), "rabbitmq_channel_created");

        Ok(channel)
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let channel = self.channel().await?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::declare(queue, e))?;

        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self.channel().await?;

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| QueueError::publish(queue, e))?
            .await
            .map_err(|e| QueueError::publish(queue, e))?;

        Ok(())
    }

    async fn fetch_once(&self, queue: &str) -> Result<Option<Message>> {
        let channel = self.channel().await?;

        let message = channel
            .basic_get(queue, BasicGetOptions { no_ack: true })
            .await
            .map_err(|e| QueueError::fetch(queue, e))?;

        Ok(message.map(|m| Message::new(m.delivery.data)))
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    async fn close(&self) {
        let channel = self.channel.lock().await;

        if channel.status().connected() {
            if let Err(e) = channel.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_connection_closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Nothing listens on port 1.
        let result = AmqpBroker::connect("amqp://127.0.0.1:1/%2f").await;
        assert!(matches!(result, Err(QueueError::Connect(_))));
    }

    fn live_url() -> String {
        std::env::var("AMQP_URL").unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".to_string())
    }

    fn unique_queue(prefix: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{}-{}-{}", prefix, std::process::id(), nanos)
    }

    async fn delete_queue(broker: &AmqpBroker, queue: &str) {
        let channel = broker.channel().await.unwrap();
        channel
            .queue_delete(queue, lapin::options::QueueDeleteOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running RabbitMQ at AMQP_URL"]
    async fn test_live_declare_publish_fetch() {
        let broker = AmqpBroker::connect(&live_url()).await.unwrap();
        let queue = unique_queue("bridge-live");

        broker.declare_queue(&queue).await.unwrap();
        broker.declare_queue(&queue).await.unwrap();
        broker.publish(&queue, br#"{"id":1}"#).await.unwrap();

        let mut message = None;
        for _ in 0..20 {
            message = broker.fetch_once(&queue).await.unwrap();
            if message.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        assert_eq!(message.unwrap().text(), r#"{"id":1}"#);
        assert_eq!(broker.fetch_once(&queue).await.unwrap(), None);

        delete_queue(&broker, &queue).await;
        broker.close().await;
        assert!(!broker.is_connected());
    }

    #[tokio::test]
    #[ignore = "requires a running RabbitMQ at AMQP_URL"]
    async fn test_live_channel_reopened_after_declare_conflict() {
        let broker = AmqpBroker::connect(&live_url()).await.unwrap();
        let transient = unique_queue("bridge-transient");
        let durable = unique_queue("bridge-durable");

        {
            let channel = broker.channel().await.unwrap();
            channel
                .queue_declare(
                    &transient,
                    QueueDeclareOptions::default(),
                    FieldTable::default(),
                )
                .await
                .unwrap();
        }

        // The broker closes the channel on the durability mismatch.
        let err = broker.declare_queue(&transient).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueDeclare { .. }));

        let mut reopened = false;
        for _ in 0..20 {
            if broker.declare_queue(&durable).await.is_ok() {
                reopened = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        assert!(reopened);
        assert!(broker.is_connected());
        broker.publish(&durable, b"after reopen").await.unwrap();

        delete_queue(&broker, &transient).await;
        delete_queue(&broker, &durable).await;
        broker.close().await;
    }
}
