use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use libsql::{Row, params};

use super::migrations::run_migrations;
use super::repository::{MonitorRepository, RepositoryError, Result};
use crate::models::{Monitor, MonitorId};
use crate::pool::{LibsqlManager, LibsqlPool, open_single_connection};

const SELECT_MONITOR: &str = "SELECT id, url, interval_ms, is_active, last_checked_ms, \
                              created_at_ms, updated_at_ms FROM monitors";

/// Durable store on a single libsql connection.
pub struct LibsqlRepository {
    pool: LibsqlPool,
}

impl LibsqlRepository {
    /// Open the database file at `path` and bring its schema up to date.
    pub async fn open(path: &str) -> Result<Self> {
        let repository = Self::new_from_pool(open_single_connection(path).await?);
        let conn = repository.get_conn().await?;
        run_migrations(&conn).await?;
        drop(conn);
        Ok(repository)
    }

    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| RepositoryError::Pool(e.to_string()))
    }
}

#[async_trait]
impl MonitorRepository for LibsqlRepository {
    async fn save(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        let inserted = conn
            .execute(
                "INSERT INTO monitors (id, url, interval_ms, is_active, last_checked_ms, created_at_ms, updated_at_ms)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    monitor.id().to_string(),
                    monitor.url(),
                    interval_to_i64(monitor.interval()),
                    i64::from(monitor.is_active()),
                    monitor.last_checked().map(|t| t.timestamp_millis()),
                    monitor.created_at().timestamp_millis(),
                    monitor.updated_at().timestamp_millis()
                ],
            )
            .await?;

        if inserted == 0 {
            return Err(RepositoryError::Conflict(monitor.id()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: MonitorId) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        let mut rows =
            conn.query(&format!("{SELECT_MONITOR} WHERE id = ?"), params![id.to_string()]).await?;

        match rows.next().await? {
            Some(row) => monitor_from_row(&row),
            None => Err(RepositoryError::NotFound(id)),
        }
    }

    async fn find_all(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(SELECT_MONITOR, ()).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn update(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors
                 SET url = ?, interval_ms = ?, is_active = ?, last_checked_ms = ?, created_at_ms = ?, updated_at_ms = ?
                 WHERE id = ?",
                params![
                    monitor.url(),
                    interval_to_i64(monitor.interval()),
                    i64::from(monitor.is_active()),
                    monitor.last_checked().map(|t| t.timestamp_millis()),
                    monitor.created_at().timestamp_millis(),
                    monitor.updated_at().timestamp_millis(),
                    monitor.id().to_string()
                ],
            )
            .await?;

        if changed == 0 {
            return Err(RepositoryError::NotFound(monitor.id()));
        }
        Ok(())
    }

    async fn delete(&self, id: MonitorId) -> Result<bool> {
        let conn = self.get_conn().await?;
        let removed = conn.execute("DELETE FROM monitors WHERE id = ?", params![id.to_string()]).await?;
        Ok(removed > 0)
    }
}

fn interval_to_i64(interval: Duration) -> i64 {
    i64::try_from(interval.as_millis()).unwrap_or(i64::MAX)
}

fn millis_to_datetime(column: &str, millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| RepositoryError::Corrupt(format!("{column} out of range: {millis}")))
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id_str: String = row.get(0)?;
    let id = id_str
        .parse::<MonitorId>()
        .map_err(|e| RepositoryError::Corrupt(format!("id {id_str:?}: {e}")))?;

    let interval_ms: i64 = row.get(2)?;
    let interval_ms = u64::try_from(interval_ms)
        .map_err(|_| RepositoryError::Corrupt(format!("negative interval for {id}")))?;

    let last_checked = row
        .get::<Option<i64>>(4)?
        .map(|ms| millis_to_datetime("last_checked_ms", ms))
        .transpose()?;

    Ok(Monitor::restore(
        id,
        row.get(1)?,
        Duration::from_millis(interval_ms),
        row.get::<i64>(3)? != 0,
        last_checked,
        millis_to_datetime("created_at_ms", row.get(5)?)?,
        millis_to_datetime("updated_at_ms", row.get(6)?)?,
    ))
}
