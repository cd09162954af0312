use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Monitor, MonitorId};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("monitor {0} not found")]
    NotFound(MonitorId),

    #[error("monitor {0} already exists")]
    Conflict(MonitorId),

    #[error("database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("database connection unavailable: {0}")]
    Pool(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

pub type Result<T, E = RepositoryError> = std::result::Result<T, E>;

/// Storage contract for monitors.
///
/// Implementations store monitors by value: what `find_*` returns is a copy
/// and mutating it has no effect until passed to `update`. A successful
/// write is visible to every later read from any caller. Writes to different
/// ids never corrupt each other. Serializing writes to the *same* id is the
/// caller's job (see `MonitorLocks`).
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// Insert a new monitor. Fails with `Conflict` if the id is taken.
    async fn save(&self, monitor: &Monitor) -> Result<()>;

    async fn find_by_id(&self, id: MonitorId) -> Result<Monitor>;

    /// Snapshot of every monitor, in no particular order.
    async fn find_all(&self) -> Result<Vec<Monitor>>;

    /// Replace the whole record with the same id. Fails with `NotFound` if it
    /// does not exist, so a late write never resurrects a deleted monitor.
    async fn update(&self, monitor: &Monitor) -> Result<()>;

    /// Remove a monitor. Returns whether a record existed; deleting an absent
    /// id is not an error.
    async fn delete(&self, id: MonitorId) -> Result<bool>;
}
