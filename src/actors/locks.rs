//! Per-key mutual exclusion
//!
//! Each key gets its own async mutex, created on first use and dropped
//! again once nobody holds or waits for it, so the table only ever holds
//! keys that are currently in use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

type LockTable = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    table: LockTable,
}

/// Held lock for one key; released on drop
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(key.to_string()).or_default().clone()
        };

        KeyGuard {
            key: key.to_string(),
            table: self.table.clone(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    /// Keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // release first so the strong count below only sees other users
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            table.remove(&self.key);
        }
    }
}
