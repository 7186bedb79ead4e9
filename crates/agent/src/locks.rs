use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = HashMap<String, Arc<Mutex<()>>>;

/// In-process lock table keyed by string. Holders of the same key run one at
/// a time; different keys never contend beyond the table lookup.
///
/// Entries are dropped as soon as no holder or waiter remains.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: Arc<StdMutex<LockTable>>,
}

pub struct KeyedGuard {
    key: String,
    entry: Arc<Mutex<()>>,
    table: Arc<StdMutex<LockTable>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: impl Into<String>) -> KeyedGuard {
        let key = key.into();
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(key.clone()).or_default().clone()
        };
        let guard = entry.clone().lock_owned().await;

        KeyedGuard { key, entry, table: self.table.clone(), guard: Some(guard) }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference lives in the table and one here; anything more is a waiter.
        if Arc::strong_count(&self.entry) == 2 {
            table.remove(&self.key);
        }
    }
}
