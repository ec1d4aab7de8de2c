//! In-process task queue with visibility timeouts
//!
//! Behaves like a hosted work queue, minus durability:
//!
//! - received messages become invisible for `visibility_timeout`
//! - unacknowledged messages reappear once their window expires, or
//!   immediately on `nack`
//! - a message that has already been delivered `max_receive_count` times is
//!   moved to the dead-letter list instead of reappearing
//! - `capacity` bounds the number of queued (ready + in-flight) messages;
//!   entries beyond it fail individually
//! - only the newest `dead_letter_limit` dead letters are retained

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::error::{QueueError, QueueResult};
use super::{
    BatchEntry, BatchFailure, BatchOutcome, DeadLetter, Delivery, MAX_BATCH_SIZE, QueueStats,
    TaskQueue,
};

#[derive(Debug, Clone)]
struct Message {
    id: String,
    body: String,
    receive_count: u32,
}

#[derive(Debug)]
struct InFlight {
    message: Message,
    visible_at: Instant,
}

/// Dead letters kept for inspection unless configured otherwise
pub const DEFAULT_DEAD_LETTER_LIMIT: usize = 1000;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<String, InFlight>,
    dead: VecDeque<DeadLetter>,
    dead_limit: usize,
    total_dead_lettered: usize,
    next_message_id: u64,
    next_receipt: u64,
    total_submitted: u64,
}

impl QueueState {
    fn bury(&mut self, letter: DeadLetter) {
        self.dead.push_back(letter);
        self.total_dead_lettered += 1;
        while self.dead.len() > self.dead_limit {
            self.dead.pop_front();
        }
    }

    /// Put a message back in line, or dead-letter it once it used up its deliveries
    fn requeue(&mut self, message: Message, max_receive_count: u32) {
        if message.receive_count >= max_receive_count {
            warn!(
                "message {} dead-lettered after {} deliveries",
                message.id, message.receive_count
            );
            self.bury(DeadLetter {
                message_id: message.id,
                body: message.body,
                reason: format!("exceeded {max_receive_count} deliveries"),
                receive_count: message.receive_count,
                dead_at: Utc::now(),
            });
        } else {
            self.ready.push_back(message);
        }
    }

    /// Return expired in-flight messages to the ready queue
    fn reclaim_expired(&mut self, now: Instant, max_receive_count: u32) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(flight) = self.in_flight.remove(&receipt) {
                trace!("visibility expired for message {}", flight.message.id);
                self.requeue(flight.message, max_receive_count);
            }
        }
    }

    fn earliest_expiry(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.visible_at).min()
    }
}

pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    visibility_timeout: Duration,
    max_receive_count: u32,
    capacity: Option<usize>,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(QueueState {
                dead_limit: DEFAULT_DEAD_LETTER_LIMIT,
                ..Default::default()
            }),
            notify: Notify::new(),
            visibility_timeout,
            max_receive_count: max_receive_count.max(1),
            capacity: None,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_dead_letter_limit(mut self, limit: usize) -> Self {
        self.state.get_mut().dead_limit = limit.max(1);
        self
    }

    /// Snapshot of the retained dead letters, oldest first
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead.iter().cloned().collect()
    }

    fn take_ready(&self, state: &mut QueueState, max: usize, now: Instant) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        while deliveries.len() < max {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };

            message.receive_count += 1;
            state.next_receipt += 1;
            let receipt = format!("{}-{}", message.id, state.next_receipt);

            deliveries.push(Delivery {
                receipt: receipt.clone(),
                message_id: message.id.clone(),
                body: message.body.clone(),
                receive_count: message.receive_count,
            });

            state.in_flight.insert(
                receipt,
                InFlight {
                    message,
                    visible_at: now + self.visibility_timeout,
                },
            );
        }

        deliveries
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn submit_batch(&self, entries: Vec<BatchEntry>) -> QueueResult<BatchOutcome> {
        if entries.is_empty() {
            return Err(QueueError::EmptyBatch);
        }
        if entries.len() > MAX_BATCH_SIZE {
            return Err(QueueError::BatchTooLarge {
                size: entries.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        let mut outcome = BatchOutcome::default();
        {
            let mut state = self.state.lock().await;

            for entry in entries {
                let depth = state.ready.len() + state.in_flight.len();
                if self.capacity.is_some_and(|cap| depth >= cap) {
                    outcome.failed.push(BatchFailure {
                        id: entry.id,
                        reason: "queue is full".to_string(),
                    });
                    continue;
                }

                state.next_message_id += 1;
                state.total_submitted += 1;
                let id = format!("msg-{}", state.next_message_id);
                state.ready.push_back(Message {
                    id,
                    body: entry.body,
                    receive_count: 0,
                });
                outcome.successful.push(entry.id);
            }
        }

        trace!(
            "batch accepted: {} ok, {} failed",
            outcome.successful.len(),
            outcome.failed.len()
        );

        if !outcome.successful.is_empty() {
            self.notify.notify_waiters();
        }

        Ok(outcome)
    }

    async fn receive(&self, max_messages: usize, wait: Duration) -> QueueResult<Vec<Delivery>> {
        let deadline = Instant::now() + wait;
        let max_messages = max_messages.max(1);

        loop {
            // register interest before inspecting the queue so a concurrent
            // submit between the check and the wait is not missed
            let notified = self.notify.notified();

            let wake_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.reclaim_expired(now, self.max_receive_count);

                let deliveries = self.take_ready(&mut state, max_messages, now);
                if !deliveries.is_empty() {
                    return Ok(deliveries);
                }

                if now >= deadline {
                    return Ok(Vec::new());
                }

                state
                    .earliest_expiry()
                    .map_or(deadline, |expiry| expiry.min(deadline))
            };

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&self, receipt: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        match state.in_flight.remove(receipt) {
            Some(flight) => {
                trace!("acked message {}", flight.message.id);
                Ok(())
            }
            None => Err(QueueError::UnknownReceipt(receipt.to_string())),
        }
    }

    async fn nack(&self, receipt: &str) -> QueueResult<()> {
        {
            let mut state = self.state.lock().await;
            let flight = state
                .in_flight
                .remove(receipt)
                .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;

            debug!("nacked message {}", flight.message.id);
            state.requeue(flight.message, self.max_receive_count);
        }

        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, receipt: &str, reason: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let flight = state
            .in_flight
            .remove(receipt)
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;

        warn!("message {} dead-lettered: {reason}", flight.message.id);
        state.bury(DeadLetter {
            message_id: flight.message.id,
            body: flight.message.body,
            reason: reason.to_string(),
            receive_count: flight.message.receive_count,
            dead_at: Utc::now(),
        });

        Ok(())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            ready: state.ready.len(),
            in_flight: state.in_flight.len(),
            dead_lettered: state.total_dead_lettered,
            total_submitted: state.total_submitted,
        })
    }
}
