use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::validation::{InvalidMonitor, validate_interval, validate_target};

/// Current wall-clock time at the precision monitors are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Opaque identifier of a monitor. Never reused once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(Uuid);

impl MonitorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MonitorId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Activity state of a monitor. Only `Active` monitors are probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Active,
    Paused,
}

/// A registered URL target.
///
/// Every mutation goes through a method that advances `updated_at`, and all
/// timestamps and the interval are kept at millisecond precision so the
/// durable backend can store them as integer epoch offsets without loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    id: MonitorId,
    url: String,
    interval: Duration,
    is_active: bool,
    last_checked: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Register a new, active monitor.
    pub fn new(url: impl Into<String>, interval: Duration) -> Result<Self, InvalidMonitor> {
        Self::new_at(url, interval, now())
    }

    pub fn new_at(
        url: impl Into<String>,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidMonitor> {
        let url = url.into();
        validate_target(&url)?;
        let interval = validate_interval(interval)?;
        let now = now.trunc_subsecs(3);

        Ok(Self {
            id: MonitorId::new(),
            url,
            interval,
            is_active: true,
            last_checked: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a monitor from stored fields. No validation is applied, the
    /// record is trusted as it was validated when first written.
    pub fn restore(
        id: MonitorId,
        url: String,
        interval: Duration,
        is_active: bool,
        last_checked: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, url, interval, is_active, last_checked, created_at, updated_at }
    }

    pub fn id(&self) -> MonitorId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn activity(&self) -> Activity {
        if self.is_active { Activity::Active } else { Activity::Paused }
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the scheduler should probe this monitor at `now`.
    ///
    /// A `last_checked` in the future (clock stepped backwards) counts as not
    /// elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }

        match self.last_checked {
            None => true,
            Some(last) => {
                let interval = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);
                now.signed_duration_since(last) >= interval
            }
        }
    }

    /// Replace target and interval.
    pub fn update(
        &mut self,
        url: impl Into<String>,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidMonitor> {
        let url = url.into();
        validate_target(&url)?;
        let interval = validate_interval(interval)?;

        self.url = url;
        self.interval = interval;
        self.touch(now);
        Ok(())
    }

    /// Move to `Paused`. Returns `false` without touching anything when the
    /// monitor is already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        self.set_active(false, now)
    }

    /// Move to `Active`. Returns `false` when already active.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        self.set_active(true, now)
    }

    /// Record a probe attempt that completed at `at`, successful or not.
    pub fn mark_checked(&mut self, at: DateTime<Utc>) {
        let at = at.trunc_subsecs(3);
        self.last_checked = Some(at);
        self.touch(at);
    }

    fn set_active(&mut self, active: bool, now: DateTime<Utc>) -> bool {
        if self.is_active == active {
            return false;
        }
        self.is_active = active;
        self.touch(now);
        true
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        // updated_at never moves backwards
        self.updated_at = self.updated_at.max(now.trunc_subsecs(3));
    }
}
