use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::repository::{MonitorRepository, RepositoryError, Result};
use crate::models::{Monitor, MonitorId};

/// Volatile store behind a single coarse reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    storage: RwLock<HashMap<MonitorId, Monitor>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorRepository for MemoryRepository {
    async fn save(&self, monitor: &Monitor) -> Result<()> {
        let mut storage = self.storage.write().await;
        match storage.entry(monitor.id()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(monitor.id())),
            Entry::Vacant(slot) => {
                slot.insert(monitor.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: MonitorId) -> Result<Monitor> {
        self.storage.read().await.get(&id).cloned().ok_or(RepositoryError::NotFound(id))
    }

    async fn find_all(&self) -> Result<Vec<Monitor>> {
        Ok(self.storage.read().await.values().cloned().collect())
    }

    async fn update(&self, monitor: &Monitor) -> Result<()> {
        let mut storage = self.storage.write().await;
        match storage.get_mut(&monitor.id()) {
            Some(stored) => {
                *stored = monitor.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(monitor.id())),
        }
    }

    async fn delete(&self, id: MonitorId) -> Result<bool> {
        Ok(self.storage.write().await.remove(&id).is_some())
    }
}
