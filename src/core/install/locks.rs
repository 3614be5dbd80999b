use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per plugin name, so two top-level operations on the same
/// plugin never interleave. Names compare case-insensitively.
///
/// Entries nobody holds or waits on are dropped on the next acquire, so the
/// table stays as large as the set of names in use.
#[derive(Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(name.to_lowercase())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// `acquire`, giving up after `wait`.
    pub async fn acquire_within(&self, name: &str, wait: Duration) -> Option<OwnedMutexGuard<()>> {
        tokio::time::timeout(wait, self.acquire(name)).await.ok()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}
