//! Bounded long-polling on top of a non-blocking fetch.
//!
//! The broker's `basic.get` returns immediately whether or not a message is
//! present. The poller repeats it with a fixed pause between attempts until a
//! message arrives or the caller's timeout budget is spent:
//!
//! ```text
//!            ┌──────────── message ───────────► Found
//!            │
//! Fetching ──┼── empty, budget spent ─────────► TimedOut
//!    ▲       │
//!    │       ├── empty, budget left ──► Waiting ──┐
//!    │       │                                    │
//!    │       └── broker error ────────────► Errored
//!    └────────────────── sleep elapsed ───────────┘
//! ```
//!
//! The pause is a tokio timer, so other requests keep running while a poll
//! waits. The shared channel is only locked for each fetch, never across the
//! pause.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::broker::Message;
use crate::connection::ConnectionManager;
use crate::error::{PollError, Result};

/// Pause between fetch attempts when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum PollState {
    Fetching,
    Waiting(Duration),
    Found(Message),
    TimedOut,
    Errored(PollError),
}

/// Decide the next state from the outcome of one fetch attempt.
fn after_fetch(
    outcome: Result<Option<Message>>,
    elapsed: Duration,
    timeout: Duration,
    interval: Duration,
) -> PollState {
    match outcome {
        Ok(Some(message)) => PollState::Found(message),
        Ok(None) if elapsed >= timeout => PollState::TimedOut,
        // Never sleep past the deadline.
        Ok(None) => PollState::Waiting(interval.min(timeout - elapsed)),
        Err(e) => PollState::Errored(e),
    }
}

/// Consumes single messages from named queues with a bounded wait.
#[derive(Clone)]
pub struct Poller {
    connection: ConnectionManager,
    interval: Duration,
}

impl Poller {
    pub fn new(connection: ConnectionManager) -> Self {
        Self::with_interval(connection, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(connection: ConnectionManager, interval: Duration) -> Self {
        Self {
            connection,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait up to `timeout` for a message on `queue`.
    ///
    /// Returns `Ok(None)` when the budget runs out with the queue still empty.
    /// A returned message has been removed from the broker and will not be
    /// delivered again. Broker errors end the poll immediately.
    pub async fn poll_for_message(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<Message>, PollError> {
        let broker = self.connection.broker().await?;
        let started = Instant::now();

        // A fetch on an unknown queue is a channel error in AMQP.
        broker.declare_queue(queue).await?;

        let mut attempts: u32 = 0;
        let mut state = PollState::Fetching;

        loop {
            state = match state {
                PollState::Fetching => {
                    attempts += 1;
                    let outcome = broker.fetch_once(queue).await;
                    after_fetch(outcome, started.elapsed(), timeout, self.interval)
                }
                PollState::Waiting(pause) => {
                    sleep(pause).await;
                    PollState::Fetching
                }
                PollState::Found(message) => {
                    info!(
                        queue = %queue,
                        attempts = attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        body_length = message.content.len(),
                        "rabbitmq_message_fetched"
                    );
                    return Ok(Some(message));
                }
                PollState::TimedOut => {
                    debug!(
                        queue = %queue,
                        attempts = attempts,
                        timeout_ms = timeout.as_millis() as u64,
                        "rabbitmq_poll_timed_out"
                    );
                    return Ok(None);
                }
                PollState::Errored(e) => return Err(e),
            };
        }
    }
}
