//! Management operations on monitors.
//!
//! Every mutation, whether it comes from the HTTP API or from a completed
//! probe, runs as read-modify-write under the per-id lock in
//! [`MonitorLocks`]. The record is always re-read inside the lock, so a write
//! can only ever replace the latest stored state of that monitor.

pub mod locks;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::database::{MonitorRepository, RepositoryError};
use crate::models::{Monitor, MonitorId, now};
use crate::monitoring::validation::InvalidMonitor;

pub use locks::MonitorLocks;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("monitor {0} not found")]
    NotFound(MonitorId),

    #[error("monitor {0} already exists")]
    Conflict(MonitorId),

    #[error(transparent)]
    InvalidMonitor(#[from] InvalidMonitor),

    #[error("storage failure: {0}")]
    Storage(#[source] RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::Conflict(id) => Self::Conflict(id),
            other => Self::Storage(other),
        }
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Clone)]
pub struct MonitorService {
    repository: Arc<dyn MonitorRepository>,
    locks: Arc<MonitorLocks>,
}

impl MonitorService {
    pub fn new(repository: Arc<dyn MonitorRepository>) -> Self {
        Self { repository, locks: Arc::new(MonitorLocks::new()) }
    }

    /// Register a new active monitor.
    pub async fn create(&self, url: &str, interval: Duration) -> Result<Monitor> {
        let monitor = Monitor::new(url, interval)?;
        self.repository.save(&monitor).await?;
        info!(monitor_id = %monitor.id(), url = %monitor.url(), "Monitor created");
        Ok(monitor)
    }

    pub async fn get(&self, id: MonitorId) -> Result<Monitor> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Monitor>> {
        Ok(self.repository.find_all().await?)
    }

    pub async fn update(&self, id: MonitorId, url: &str, interval: Duration) -> Result<Monitor> {
        let updated = self
            .modify(id, |monitor| {
                monitor.update(url, interval, now())?;
                Ok(true)
            })
            .await?;
        info!(monitor_id = %id, url = %updated.url(), "Monitor updated");
        Ok(updated)
    }

    /// Stop probing a monitor. Pausing a paused monitor changes nothing.
    pub async fn pause(&self, id: MonitorId) -> Result<Monitor> {
        self.modify(id, |monitor| Ok(monitor.pause(now()))).await
    }

    /// Resume probing a monitor. Resuming an active monitor changes nothing.
    pub async fn resume(&self, id: MonitorId) -> Result<Monitor> {
        self.modify(id, |monitor| Ok(monitor.resume(now()))).await
    }

    /// Remove a monitor permanently. Returns whether it existed.
    pub async fn delete(&self, id: MonitorId) -> Result<bool> {
        let guard = self.locks.lock(id).await;
        let removed = self.repository.delete(id).await?;
        drop(guard);

        if removed {
            self.locks.forget(id);
            info!(monitor_id = %id, "Monitor deleted");
        }
        Ok(removed)
    }

    /// Write back a probe completion: sets `last_checked` on the current
    /// record, leaving every other field as the latest writer left it.
    pub async fn record_check(&self, id: MonitorId, completed_at: DateTime<Utc>) -> Result<Monitor> {
        self.modify(id, |monitor| {
            monitor.mark_checked(completed_at);
            Ok(true)
        })
        .await
    }

    async fn modify<F>(&self, id: MonitorId, apply: F) -> Result<Monitor>
    where
        F: FnOnce(&mut Monitor) -> Result<bool>,
    {
        let _guard = self.locks.lock(id).await;

        let mut monitor = self.repository.find_by_id(id).await?;
        if apply(&mut monitor)? {
            self.repository.update(&monitor).await?;
        } else {
            debug!(monitor_id = %id, "No change, skipping write");
        }
        Ok(monitor)
    }
}
