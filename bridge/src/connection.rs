//! Lifecycle of the shared broker connection.
//!
//! One [`ConnectionManager`] is created at startup and cloned into the
//! publisher, the poller and the web state. It is written when the broker is
//! established and on shutdown; every request only reads it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::broker::{AmqpBroker, Broker};
use crate::error::{ConnectError, QueueError, Result};

/// Lifecycle of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the single broker handle shared by all requests.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    state: ConnectionState,
    broker: Option<Arc<dyn Broker>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                state: ConnectionState::Uninitialized,
                broker: None,
            })),
        }
    }

    /// Connect to RabbitMQ at `url`. Called once, before the listener starts.
    pub async fn connect(&self, url: &str) -> std::result::Result<(), ConnectError> {
        let url = url.to_string();
        self.establish(async move {
            let broker = AmqpBroker::connect(&url).await?;
            Ok::<_, QueueError>(Arc::new(broker) as Arc<dyn Broker>)
        })
        .await
    }

    /// Drive the lifecycle with any broker-producing future.
    ///
    /// Moves to `Connecting`, then `Ready` on success or `Failed` on error.
    pub async fn establish<F>(&self, connect: F) -> std::result::Result<(), ConnectError>
    where
        F: Future<Output = Result<Arc<dyn Broker>>>,
    {
        self.inner.write().await.state = ConnectionState::Connecting;

        match connect.await {
            Ok(broker) => {
                let mut inner = self.inner.write().await;
                inner.broker = Some(broker);
                inner.state = ConnectionState::Ready;
                info!("broker_connection_ready");
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.write().await;
                inner.broker = None;
                inner.state = ConnectionState::Failed;
                error!(error = %e, "broker_connection_failed");
                Err(match e {
                    QueueError::Connect(_) => e,
                    other => QueueError::Connect(other.to_string()),
                })
            }
        }
    }

    /// Current lifecycle state, demoting `Ready` to `Failed` if the transport dropped.
    pub async fn state(&self) -> ConnectionState {
        match self.broker().await {
            Ok(_) => ConnectionState::Ready,
            Err(_) => self.inner.read().await.state,
        }
    }

    /// The ready broker, or [`QueueError::BrokerUnavailable`] without any I/O.
    pub async fn broker(&self) -> Result<Arc<dyn Broker>> {
        {
            let inner = self.inner.read().await;
            match (&inner.state, &inner.broker) {
                (ConnectionState::Ready, Some(broker)) if broker.is_connected() => {
                    return Ok(Arc::clone(broker));
                }
                (ConnectionState::Ready, Some(_)) => {}
                _ => return Err(QueueError::BrokerUnavailable),
            }
        }

        // Transport dropped under a Ready state; no reconnection is attempted.
        let mut inner = self.inner.write().await;
        if inner.state == ConnectionState::Ready {
            inner.state = ConnectionState::Failed;
            warn!("broker_connection_lost");
        }
        Err(QueueError::BrokerUnavailable)
    }

    /// Close the broker and return to `Uninitialized`.
    pub async fn close(&self) {
        let broker = {
            let mut inner = self.inner.write().await;
            inner.state = ConnectionState::Uninitialized;
            inner.broker.take()
        };

        if let Some(broker) = broker {
            broker.close().await;
        }
    }
}
