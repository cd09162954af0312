use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::checker::Checker;
use super::observer::CheckObserver;
use super::types::CheckOutcome;
use crate::models::{Monitor, MonitorId, now};
use crate::service::{MonitorService, ServiceError};

/// Monitoring executor - runs one check for one monitor
///
/// Per invocation: one network call through the checker, one outcome handed
/// to the observer, one write of `last_checked` through the service. Probe
/// and storage failures end here; nothing is retried or returned as an error.
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
    observer: Arc<dyn CheckObserver>,
    service: MonitorService,
}

impl MonitoringExecutor {
    pub fn new(
        checker: Arc<dyn Checker>,
        observer: Arc<dyn CheckObserver>,
        service: MonitorService,
    ) -> Self {
        Self { checker, observer, service }
    }

    /// Re-read the monitor and check it only if it is still due at `due_at`.
    ///
    /// Deleted, paused and already-checked monitors are skipped without an
    /// outcome or a write. The probe uses the stored URL, not the caller's.
    pub async fn execute_if_due(
        &self,
        id: MonitorId,
        due_at: DateTime<Utc>,
    ) -> Option<CheckOutcome> {
        let monitor = match self.service.get(id).await {
            Ok(monitor) => monitor,
            Err(ServiceError::NotFound(_)) => {
                debug!(monitor_id = %id, "Monitor deleted before its check started");
                return None;
            }
            Err(e) => {
                warn!(monitor_id = %id, "Failed to load monitor, skipping check: {}", e);
                return None;
            }
        };

        if !monitor.is_due(due_at) {
            debug!(monitor_id = %id, active = monitor.is_active(), "No longer due, skipping check");
            return None;
        }

        Some(self.execute_check(&monitor).await)
    }

    /// Execute a monitoring check
    pub async fn execute_check(&self, monitor: &Monitor) -> CheckOutcome {
        let start = Instant::now();
        let result = self.checker.check(monitor.url()).await;
        let latency = start.elapsed();
        let completed_at = now();

        let outcome = match result {
            Ok(status_code) => CheckOutcome::success(
                monitor.id(),
                monitor.url().to_string(),
                status_code,
                latency,
                completed_at,
            ),
            Err(e) => CheckOutcome::failure(
                monitor.id(),
                monitor.url().to_string(),
                e.to_string(),
                latency,
                completed_at,
            ),
        };

        self.observer.record(&outcome);

        match self.service.record_check(monitor.id(), completed_at).await {
            Ok(_) => {}
            Err(ServiceError::NotFound(id)) => {
                debug!(monitor_id = %id, "Monitor deleted while being checked, dropping result");
            }
            Err(e) => {
                warn!(monitor_id = %monitor.id(), "Failed to store check time: {}", e);
            }
        }

        outcome
    }
}
