//! Health store trait definition
//!
//! This module defines the `HealthStore` trait that all storage
//! implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{CheckHistoryRow, StoredRecord};
use crate::MonitorHealthRecord;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Durable per-monitor health state
///
/// Implementations must be `Send + Sync` as they are shared by every
/// dispatch worker.
///
/// ## Conditional writes
///
/// [`HealthStore::put`] only succeeds when the stored version still equals
/// `expected_version` (`None` meaning "no record yet"). Otherwise it fails
/// with [`StorageError::VersionConflict`](super::StorageError::VersionConflict)
/// and leaves the stored record untouched.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Current record of a monitor, `None` if it was never written
    async fn get(&self, monitor_id: &str) -> StorageResult<Option<StoredRecord>>;

    /// Conditionally write a record; returns the new version
    async fn put(
        &self,
        monitor_id: &str,
        record: &MonitorHealthRecord,
        cycle: i64,
        expected_version: Option<u64>,
    ) -> StorageResult<u64>;

    /// Every stored record, keyed by monitor id
    async fn list_records(&self) -> StorageResult<HashMap<String, StoredRecord>>;

    /// Append one applied check to the history
    async fn append_history(&self, row: CheckHistoryRow) -> StorageResult<()>;

    /// The `limit` most recent checks of a monitor, newest first
    async fn query_history(
        &self,
        monitor_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<CheckHistoryRow>>;

    /// Delete history rows older than `before`; returns the number deleted
    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Lightweight liveness probe of the backend
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release resources
    async fn close(&self) -> StorageResult<()>;
}
