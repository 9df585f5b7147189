//! Per-key mutual exclusion for multi-step writes.
//!
//! Each key gets its own mutex, created on demand and dropped once no
//! caller holds or waits for it. The map shard is only locked while the
//! mutex is looked up, never across storage I/O.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Default)]
pub(crate) struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` while holding the lock for `key`
    pub fn with<R>(&self, key: &str, op: impl FnOnce() -> R) -> R {
        let existing = self.locks.get(key).map(|lock| lock.clone());
        let lock = match existing {
            Some(lock) => lock,
            None => self.locks.entry(key.to_string()).or_default().clone(),
        };

        let result = {
            let _guard = lock.lock();
            op()
        };

        drop(lock);
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of keys currently locked or waited on
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
