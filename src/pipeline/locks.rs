//! Keyed lock table
//!
//! At most one holder per key. Entries are created on first use and evicted
//! when the last holder or waiter lets go, so the table only holds keys that
//! are in flight.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Per-key async mutual exclusion
#[derive(Debug, Default, Clone)]
pub struct KeyedLocks {
    table: Arc<LockTable>,
}

/// Holds the lock for one key until dropped
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds `key`, then takes it
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = self
            .table
            .entry(key.to_string())
            .or_default()
            .value()
            .clone();

        let guard = lock.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            guard: Some(guard),
            table: self.table.clone(),
        }
    }

    /// Number of keys currently held or awaited
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: nobody holds or waits
        self.table
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
