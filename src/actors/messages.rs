//! Message types for actor communication
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Reports**: Plain data returned through oneshot channels or read by the API

use serde::Serialize;
use tokio::sync::oneshot;

use crate::HealthState;
use crate::monitors::AlertDecision;

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Fan out immediately, independent of the ticker
    TickNow {
        respond_to: oneshot::Sender<anyhow::Result<FanOutReport>>,
    },

    /// Stop the ticker; tasks already submitted stay queued
    Shutdown,
}

/// Commands that can be sent to the RetentionActor
#[derive(Debug)]
pub enum RetentionCommand {
    /// Prune check history now; responds with the number of rows deleted
    RunNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    Shutdown,
}

/// Result of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    /// Cycle stamp shared by every task of this fan-out
    pub cycle: i64,

    /// Active monitors found in the registry
    pub monitors: usize,

    /// Batches submitted (successfully or not)
    pub batches: usize,

    /// Tasks accepted by the queue
    pub submitted: usize,

    /// Tasks that could not be enqueued
    pub failed: usize,
}

/// What happened to one delivered task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// State was advanced (and possibly alerted on)
    Applied {
        state: HealthState,
        consecutive_failures: u32,
        alert: AlertDecision,
        notified: bool,
    },

    /// Duplicate or stale delivery; nothing changed
    Skipped,

    /// Malformed body, moved to the dead-letter list
    DeadLettered,
}

/// Snapshot of the dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub received: u64,
    pub applied: u64,
    pub skipped: u64,
    pub dead_lettered: u64,

    /// Deliveries left unacknowledged for redelivery
    pub retried: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
}
