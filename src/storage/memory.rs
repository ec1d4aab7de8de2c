//! In-memory health store
//!
//! Used when persistence is disabled and in tests. State is lost on
//! restart; history is capped per monitor.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, HealthStore};
use super::error::{StorageError, StorageResult};
use super::schema::{CheckHistoryRow, StoredRecord};
use crate::MonitorHealthRecord;

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, StoredRecord>,
    history: HashMap<String, VecDeque<CheckHistoryRow>>,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    history_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemoryStore {
    /// Create a store keeping at most `history_limit` checks per monitor
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            history_limit: history_limit.max(1),
        }
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn get(&self, monitor_id: &str) -> StorageResult<Option<StoredRecord>> {
        Ok(self.state.read().await.records.get(monitor_id).copied())
    }

    async fn put(
        &self,
        monitor_id: &str,
        record: &MonitorHealthRecord,
        cycle: i64,
        expected_version: Option<u64>,
    ) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let current = state.records.get(monitor_id).map(|r| r.version);

        if current != expected_version {
            debug!(
                "conditional write for {} rejected: stored {:?}, expected {:?}",
                monitor_id, current, expected_version
            );
            return Err(StorageError::VersionConflict {
                monitor_id: monitor_id.to_string(),
                expected: expected_version,
            });
        }

        let version = current.unwrap_or(0) + 1;
        state.records.insert(
            monitor_id.to_string(),
            StoredRecord {
                record: *record,
                version,
                last_cycle: cycle,
            },
        );

        trace!("stored {} at version {}", monitor_id, version);
        Ok(version)
    }

    async fn list_records(&self) -> StorageResult<HashMap<String, StoredRecord>> {
        Ok(self.state.read().await.records.clone())
    }

    async fn append_history(&self, row: CheckHistoryRow) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let entries = state.history.entry(row.monitor_id.clone()).or_default();

        entries.push_back(row);
        while entries.len() > self.history_limit {
            entries.pop_front();
        }

        Ok(())
    }

    async fn query_history(
        &self,
        monitor_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<CheckHistoryRow>> {
        let state = self.state.read().await;

        Ok(state
            .history
            .get(monitor_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let mut deleted = 0;

        for entries in state.history.values_mut() {
            let len = entries.len();
            entries.retain(|row| row.checked_at >= before);
            deleted += len - entries.len();
        }
        state.history.retain(|_, entries| !entries.is_empty());

        debug!("removed {} history rows older than {}", deleted, before);
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;

        Ok(HealthStatus {
            healthy: true,
            message: "in-memory store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("monitors".to_string(), state.records.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
