//! API response types

use serde::{Deserialize, Serialize};

use crate::actors::DispatchStats;
use crate::queue::QueueStats;
use crate::storage::CheckHistoryRow;
use crate::{HealthState, MonitorDefinition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// One monitor with its current health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub active: bool,
    pub threshold_count: u32,
    pub state: HealthState,
    pub consecutive_failures: u32,

    /// `None` until the monitor was checked once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl MonitorStatus {
    pub fn new(monitor: &MonitorDefinition, stored: Option<&crate::storage::StoredRecord>) -> Self {
        let record = stored.map(|s| s.record).unwrap_or_default();

        Self {
            id: monitor.id.clone(),
            name: monitor.name.clone(),
            endpoint: monitor.endpoint.clone(),
            active: monitor.active,
            threshold_count: monitor.threshold_count,
            state: record.state,
            consecutive_failures: record.consecutive_failures,
            last_checked_at: stored.map(|s| s.record.last_checked_at.to_rfc3339()),
            version: stored.map(|s| s.version),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorsResponse {
    pub monitors: Vec<MonitorStatus>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub monitor_id: String,
    pub checks: Vec<CheckHistoryRow>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub healthy: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub timestamp: String,
    pub uptime_secs: i64,
    pub dispatch: DispatchStats,
    pub queue: QueueStats,
    pub storage: StorageStatus,
}
