//! Hysteresis state engine
//!
//! Converts a stream of probe outcomes into a coarse health state using a
//! bounded failure counter:
//!
//! ```text
//! probe failed:    counter = min(counter + 1, threshold)
//! probe succeeded: counter = max(counter - 1, 0)
//!
//! counter == 0          → HEALTHY
//! 0 < counter < T       → DEGRADED
//! counter == T          → UNHEALTHY
//! ```
//!
//! Recovery is gradual: a monitor that reached UNHEALTHY needs `threshold`
//! successful probes to clear, so a single good response during an outage
//! does not produce a recovery alert followed by another outage alert.
//!
//! Alerts are edge-triggered on the counter crossing a boundary, never on
//! the derived state alone.

use chrono::{DateTime, Utc};

use crate::{HealthState, MonitorHealthRecord, ProbeOutcome};

/// Whether a step crossed a boundary that operators must hear about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    NoAlert,
    /// Counter just reached the threshold
    UnhealthyAlert,
    /// Counter just returned to zero
    RecoveryAlert,
}

impl AlertDecision {
    pub fn should_notify(&self) -> bool {
        !matches!(self, AlertDecision::NoAlert)
    }
}

/// Outcome of one state engine step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: MonitorHealthRecord,
    pub next: MonitorHealthRecord,
    pub alert: AlertDecision,
}

/// Apply one probe outcome to the previous record
///
/// Pure and deterministic: the same inputs always produce the same
/// transition. `now` becomes the new `last_checked_at`.
///
/// A `threshold` of 0 is treated as 1. A previous counter above the
/// threshold (the monitor's threshold was lowered) is clamped first.
pub fn step(
    previous: &MonitorHealthRecord,
    outcome: &ProbeOutcome,
    threshold: u32,
    now: DateTime<Utc>,
) -> Transition {
    let threshold = threshold.max(1);
    let before = previous.consecutive_failures.min(threshold);

    let after = if outcome.success {
        before.saturating_sub(1)
    } else {
        (before + 1).min(threshold)
    };

    let alert = if before < threshold && after == threshold {
        AlertDecision::UnhealthyAlert
    } else if before > 0 && after == 0 {
        AlertDecision::RecoveryAlert
    } else {
        AlertDecision::NoAlert
    };

    let next = MonitorHealthRecord {
        consecutive_failures: after,
        state: HealthState::from_counter(after, threshold),
        last_checked_at: now,
    };

    Transition {
        previous: *previous,
        next,
        alert,
    }
}
