//! Health state persistence
//!
//! ## Design
//!
//! - **Trait-based**: `HealthStore` allows swapping implementations
//! - **Conditional writes**: every `put` names the version it was computed
//!   from and fails on mismatch
//! - **History on the side**: check history is an audit log; losing a row
//!   never affects health state
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database with WAL mode
//! - **In-Memory**: No persistence, for tests or when storage is disabled
//!
//! ## Usage
//!
//! ```no_run
//! use pulseguard::storage::{HealthStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./pulseguard.db").await?;
//!     let record = store.get("checkout-api").await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, HealthStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use schema::{CheckHistoryRow, StoredRecord};
