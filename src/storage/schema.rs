//! Row types persisted by the health store
//!
//! `monitor_health` holds one row per monitor: the current
//! [`MonitorHealthRecord`] plus the bookkeeping needed for conditional
//! writes. `check_history` is an append-only audit log of applied checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FailureReason, HealthState, MonitorHealthRecord, ProbeOutcome};

/// Current record of one monitor as returned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    #[serde(flatten)]
    pub record: MonitorHealthRecord,

    /// Optimistic-concurrency token, 1 after the first insert
    pub version: u64,

    /// Cycle stamp of the last applied probe task
    pub last_cycle: i64,
}

/// One applied check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckHistoryRow {
    pub monitor_id: String,
    pub checked_at: DateTime<Utc>,
    pub cycle: i64,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub status_code: u16,
    pub latency_ms: u64,
    pub failure_reason: FailureReason,
}

impl CheckHistoryRow {
    pub fn new(
        monitor_id: impl Into<String>,
        cycle: i64,
        record: &MonitorHealthRecord,
        outcome: &ProbeOutcome,
    ) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            checked_at: record.last_checked_at,
            cycle,
            state: record.state,
            consecutive_failures: record.consecutive_failures,
            status_code: outcome.status_code,
            latency_ms: outcome.latency_ms,
            failure_reason: outcome.failure_reason,
        }
    }
}
