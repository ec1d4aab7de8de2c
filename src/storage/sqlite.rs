//! SQLite health store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (status API) do not block the dispatch workers
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Conditional writes are single statements guarded on the `version`
//! column, so two processes sharing one database file cannot both apply a
//! transition computed from the same read.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, HealthStore};
use super::error::{StorageError, StorageResult};
use super::schema::{CheckHistoryRow, StoredRecord};
use crate::{FailureReason, HealthState, MonitorHealthRecord};

/// SQLite health store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn parse_state(raw: &str) -> StorageResult<HealthState> {
        raw.parse().map_err(StorageError::SerializationError)
    }

    fn stored_from_row(row: &SqliteRow) -> StorageResult<StoredRecord> {
        let state: String = row.try_get("state")?;
        let failures: i64 = row.try_get("consecutive_failures")?;
        let version: i64 = row.try_get("version")?;

        Ok(StoredRecord {
            record: MonitorHealthRecord {
                consecutive_failures: failures as u32,
                state: Self::parse_state(&state)?,
                last_checked_at: Self::millis_to_timestamp(row.try_get("last_checked_at")?),
            },
            version: version as u64,
            last_cycle: row.try_get("last_cycle")?,
        })
    }

    fn history_from_row(row: &SqliteRow) -> StorageResult<CheckHistoryRow> {
        let state: String = row.try_get("state")?;
        let reason: String = row.try_get("failure_reason")?;
        let failures: i64 = row.try_get("consecutive_failures")?;
        let status_code: i64 = row.try_get("status_code")?;
        let latency_ms: i64 = row.try_get("latency_ms")?;

        Ok(CheckHistoryRow {
            monitor_id: row.try_get("monitor_id")?,
            checked_at: Self::millis_to_timestamp(row.try_get("checked_at")?),
            cycle: row.try_get("cycle")?,
            state: Self::parse_state(&state)?,
            consecutive_failures: failures as u32,
            status_code: status_code as u16,
            latency_ms: latency_ms as u64,
            failure_reason: reason
                .parse::<FailureReason>()
                .map_err(StorageError::SerializationError)?,
        })
    }
}

#[async_trait]
impl HealthStore for SqliteStore {
    #[instrument(skip(self))]
    async fn get(&self, monitor_id: &str) -> StorageResult<Option<StoredRecord>> {
        let row = sqlx::query(
            r#"
            SELECT consecutive_failures, state, last_checked_at, version, last_cycle
            FROM monitor_health
            WHERE monitor_id = ?
            "#,
        )
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::stored_from_row).transpose()
    }

    #[instrument(skip(self, record), fields(state = %record.state))]
    async fn put(
        &self,
        monitor_id: &str,
        record: &MonitorHealthRecord,
        cycle: i64,
        expected_version: Option<u64>,
    ) -> StorageResult<u64> {
        let checked_at = record.last_checked_at.timestamp_millis();

        let (result, new_version) = match expected_version {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO monitor_health
                        (monitor_id, consecutive_failures, state, last_checked_at, version, last_cycle)
                    VALUES (?, ?, ?, ?, 1, ?)
                    ON CONFLICT(monitor_id) DO NOTHING
                    "#,
                )
                .bind(monitor_id)
                .bind(record.consecutive_failures as i64)
                .bind(record.state.as_str())
                .bind(checked_at)
                .bind(cycle)
                .execute(&self.pool)
                .await?;
                (result, 1)
            }
            Some(version) => {
                let result = sqlx::query(
                    r#"
                    UPDATE monitor_health
                    SET consecutive_failures = ?, state = ?, last_checked_at = ?,
                        version = version + 1, last_cycle = ?
                    WHERE monitor_id = ? AND version = ?
                    "#,
                )
                .bind(record.consecutive_failures as i64)
                .bind(record.state.as_str())
                .bind(checked_at)
                .bind(cycle)
                .bind(monitor_id)
                .bind(version as i64)
                .execute(&self.pool)
                .await?;
                (result, version + 1)
            }
        };

        if result.rows_affected() == 0 {
            debug!("conditional write lost for {}", monitor_id);
            return Err(StorageError::VersionConflict {
                monitor_id: monitor_id.to_string(),
                expected: expected_version,
            });
        }

        Ok(new_version)
    }

    #[instrument(skip(self))]
    async fn list_records(&self) -> StorageResult<HashMap<String, StoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT monitor_id, consecutive_failures, state, last_checked_at, version, last_cycle
            FROM monitor_health
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StorageResult<(String, StoredRecord)> {
                Ok((row.try_get("monitor_id")?, Self::stored_from_row(row)?))
            })
            .collect()
    }

    #[instrument(skip(self, row), fields(monitor_id = %row.monitor_id))]
    async fn append_history(&self, row: CheckHistoryRow) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO check_history
                (monitor_id, checked_at, cycle, state, consecutive_failures,
                 status_code, latency_ms, failure_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.monitor_id)
        .bind(row.checked_at.timestamp_millis())
        .bind(row.cycle)
        .bind(row.state.as_str())
        .bind(row.consecutive_failures as i64)
        .bind(row.status_code as i64)
        .bind(row.latency_ms as i64)
        .bind(row.failure_reason.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_history(
        &self,
        monitor_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<CheckHistoryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT monitor_id, checked_at, cycle, state, consecutive_failures,
                   status_code, latency_ms, failure_reason
            FROM check_history
            WHERE monitor_id = ?
            ORDER BY checked_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(monitor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::history_from_row).collect()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM check_history WHERE checked_at < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old history rows", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite store operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
