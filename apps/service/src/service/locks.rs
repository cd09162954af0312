use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::MonitorId;

/// One async mutex per monitor id.
///
/// Holding the guard for an id is required for every read-modify-write of
/// that monitor. Different ids never contend.
#[derive(Debug, Default)]
pub struct MonitorLocks {
    locks: Mutex<HashMap<MonitorId, Arc<AsyncMutex<()>>>>,
}

pub type MonitorGuard = OwnedMutexGuard<()>;

impl MonitorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: MonitorId) -> MonitorGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry for a deleted monitor. Tasks already waiting on the old
    /// mutex still get it and then observe the deletion.
    pub fn forget(&self, id: MonitorId) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_id_is_exclusive() {
        let locks = MonitorLocks::new();
        let id = MonitorId::new();

        let guard = locks.lock(id).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(id)).await;
        assert!(second.is_err(), "second lock on the same id must wait");

        drop(guard);
        let _second = tokio::time::timeout(Duration::from_millis(50), locks.lock(id))
            .await
            .expect("lock released");
    }

    #[tokio::test]
    async fn test_different_ids_do_not_contend() {
        let locks = MonitorLocks::new();
        let _a = locks.lock(MonitorId::new()).await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock(MonitorId::new()))
            .await
            .expect("independent ids");
    }

    #[tokio::test]
    async fn test_forget_removes_entry() {
        let locks = MonitorLocks::new();
        let id = MonitorId::new();
        drop(locks.lock(id).await);
        assert_eq!(locks.len(), 1);

        locks.forget(id);
        assert_eq!(locks.len(), 0);
    }
}
