//! Input validation for monitor targets, intervals and checker settings.

use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMonitor {
    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Invalid scheme for HTTP monitor: {0}")]
    Scheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("Check interval must be at least one millisecond")]
    Interval,
}

/// Validate a probe target. Only absolute `http`/`https` URLs with a host
/// are accepted.
pub fn validate_target(target: &str) -> Result<(), InvalidMonitor> {
    let url = Url::parse(target).map_err(|e| InvalidMonitor::Url(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(InvalidMonitor::Scheme(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(InvalidMonitor::MissingHost(target.to_string()));
    }

    Ok(())
}

/// Normalize an interval to millisecond precision and reject zero.
pub fn validate_interval(interval: Duration) -> Result<Duration, InvalidMonitor> {
    let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Err(InvalidMonitor::Interval);
    }
    Ok(Duration::from_millis(millis))
}

/// Validate the probe timeout is reasonable
pub fn validate_timeout(timeout_seconds: u64) -> Result<(), String> {
    const MIN_TIMEOUT: u64 = 1;
    const MAX_TIMEOUT: u64 = 300; // 5 minutes

    if timeout_seconds < MIN_TIMEOUT {
        return Err(format!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds, MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(format!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds, MAX_TIMEOUT
        ));
    }

    Ok(())
}
