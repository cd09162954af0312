use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::MonitorId;

/// Status of a monitoring check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// A response was received, whatever its status code.
    Up,
    /// No response: timeout, connection or DNS failure.
    Down,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Up => write!(f, "up"),
            CheckStatus::Down => write!(f, "down"),
        }
    }
}

/// Result of one probe, handed to the observer exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    /// Monitor that was checked
    pub monitor_id: MonitorId,

    /// URL that was requested
    pub url: String,

    /// HTTP status code, `0` when no response was received
    pub status_code: u16,

    /// Time from request start to completion, timeout or error
    pub latency: Duration,

    /// Error message when the check failed
    pub error: Option<String>,

    /// Completion time, also written to the monitor as `last_checked`
    pub checked_at: DateTime<Utc>,
}

impl CheckOutcome {
    pub fn success(
        monitor_id: MonitorId,
        url: String,
        status_code: u16,
        latency: Duration,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self { monitor_id, url, status_code, latency, error: None, checked_at }
    }

    pub fn failure(
        monitor_id: MonitorId,
        url: String,
        error: String,
        latency: Duration,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self { monitor_id, url, status_code: 0, latency, error: Some(error), checked_at }
    }

    pub fn status(&self) -> CheckStatus {
        if self.error.is_none() { CheckStatus::Up } else { CheckStatus::Down }
    }
}
