//! Work distribution between the scheduler and the dispatch loop
//!
//! The transport contract is deliberately weak:
//!
//! - **At-least-once**: a delivery that is not acknowledged within the
//!   visibility window is delivered again
//! - **Unordered**: no ordering across or within monitors
//! - **Bounded batches**: at most [`MAX_BATCH_SIZE`] entries per submission,
//!   with per-entry success/failure
//!
//! Everything above this layer (per-monitor locking, cycle stamps on the
//! stored record) exists to stay correct under that contract.

pub mod error;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{InvalidMonitor, MonitorDefinition};

pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;

/// Largest batch a single submission may carry
pub const MAX_BATCH_SIZE: usize = 10;

/// One probe cycle for one monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTask {
    /// Fan-out stamp (Unix millis of the scheduler tick), shared by every
    /// task of the same fan-out and increasing between fan-outs
    pub cycle: i64,

    pub monitor: MonitorDefinition,
}

/// Why a delivered body could not be turned into a [`ProbeTask`]
#[derive(Debug)]
pub enum MalformedTask {
    Decode(serde_json::Error),
    Invalid(InvalidMonitor),
}

impl std::fmt::Display for MalformedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedTask::Decode(e) => write!(f, "undecodable task body: {e}"),
            MalformedTask::Invalid(e) => write!(f, "invalid monitor definition: {e}"),
        }
    }
}

impl std::error::Error for MalformedTask {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MalformedTask::Decode(e) => Some(e),
            MalformedTask::Invalid(e) => Some(e),
        }
    }
}

impl ProbeTask {
    pub fn new(cycle: i64, monitor: MonitorDefinition) -> Self {
        Self { cycle, monitor }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse and validate a delivered body
    pub fn decode(body: &str) -> Result<Self, MalformedTask> {
        let task: ProbeTask = serde_json::from_str(body).map_err(MalformedTask::Decode)?;
        task.monitor.validate().map_err(MalformedTask::Invalid)?;
        Ok(task)
    }
}

/// One entry of a batch submission
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Caller-chosen id, unique within the batch
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub reason: String,
}

/// Per-entry result of a batch submission
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

/// A message handed to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Handle for ack/nack/dead-letter; only valid for this delivery
    pub receipt: String,
    pub message_id: String,
    pub body: String,

    /// How many times this message has been delivered, including this one
    pub receive_count: u32,
}

/// A message that was given up on
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: String,
    pub reason: String,
    pub receive_count: u32,
    pub dead_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub ready: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
    pub total_submitted: u64,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit up to [`MAX_BATCH_SIZE`] entries; individual entries may fail
    async fn submit_batch(&self, entries: Vec<BatchEntry>) -> QueueResult<BatchOutcome>;

    /// Receive up to `max_messages`, waiting at most `wait` for the first one
    async fn receive(&self, max_messages: usize, wait: Duration) -> QueueResult<Vec<Delivery>>;

    /// Mark a delivery as processed
    async fn ack(&self, receipt: &str) -> QueueResult<()>;

    /// Give a delivery back for redelivery without waiting for its visibility window
    async fn nack(&self, receipt: &str) -> QueueResult<()>;

    /// Route a delivery to the dead-letter list; it is never redelivered
    async fn dead_letter(&self, receipt: &str, reason: &str) -> QueueResult<()>;

    async fn stats(&self) -> QueueResult<QueueStats>;
}
