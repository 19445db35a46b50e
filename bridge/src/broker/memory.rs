//! In-process broker.
//!
//! Mirrors the AMQP behaviours the bridge relies on: durable declaration is
//! idempotent but conflicts with an existing transient queue, publishing to an
//! undeclared queue drops the message, and fetching from an undeclared queue is
//! an error. Used by the test suite and by `BROKER=memory` local runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Broker, Message};
use crate::error::{QueueError, Result};

#[derive(Debug, Default)]
struct MemoryQueue {
    durable: bool,
    messages: VecDeque<Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, MemoryQueue>>,
    connected: AtomicBool,
    fail_on_publish: AtomicBool,
    fail_on_fetch: AtomicBool,
    fetch_count: AtomicUsize,
    declare_latency_ms: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Create a non-durable queue, as another client of the broker might.
    pub async fn declare_transient(&self, queue: &str) {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default();
    }

    /// Number of messages currently held by `queue`.
    pub async fn depth(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Total `fetch_once` calls served, including empty ones.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_fetch(&self, fail: bool) {
        self.fail_on_fetch.store(fail, Ordering::SeqCst);
    }

    /// Delay every `declare_queue` by `latency`, like a slow broker round-trip.
    pub fn set_declare_latency(&self, latency: Duration) {
        self.declare_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Simulate the transport dropping.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(QueueError::BrokerUnavailable)
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.ensure_connected()?;

        let latency = self.declare_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let mut queues = self.queues.lock().await;
        match queues.get(queue) {
            Some(existing) if !existing.durable => Err(QueueError::declare(
                queue,
                "PRECONDITION_FAILED - inequivalent arg 'durable'",
            )),
            Some(_) => Ok(()),
            None => {
                queues.insert(
                    queue.to_string(),
                    MemoryQueue {
                        durable: true,
                        messages: VecDeque::new(),
                    },
                );
                debug!(queue = %queue, "memory_queue_declared");
                Ok(())
            }
        }
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.ensure_connected()?;

        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(QueueError::publish(queue, "simulated publish failure"));
        }

        // Unroutable messages on the default exchange are dropped.
        if let Some(q) = self.queues.lock().await.get_mut(queue) {
            q.messages.push_back(payload.to_vec());
        }

        Ok(())
    }

    async fn fetch_once(&self, queue: &str) -> Result<Option<Message>> {
        self.ensure_connected()?;
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_fetch.load(Ordering::SeqCst) {
            return Err(QueueError::fetch(queue, "simulated fetch failure"));
        }

        let mut queues = self.queues.lock().await;
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::fetch(queue, "NOT_FOUND - no queue"))?;

        Ok(q.messages.pop_front().map(Message::new))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.disconnect();
    }
}
