//! Connection configuration and resolution.

use std::time::Duration;

/// Longest line the codec will buffer before giving up on it.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Default time to wait for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the notification and error observer channels.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// Environment variable overriding the request timeout, in milliseconds.
pub const TIMEOUT_ENV: &str = "LINEWIRE_TIMEOUT_MS";

/// Tunables for a single connection.
#[derive(Debug, Clone)]
pub struct WireConfig {
    pub request_timeout: Duration,
    pub max_line_bytes: usize,
    pub observer_capacity: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            request_timeout: resolve_request_timeout(None),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
        }
    }
}

/// Resolve the request timeout: explicit value, then `LINEWIRE_TIMEOUT_MS`,
/// then the 10 second default.
pub fn resolve_request_timeout(explicit: Option<Duration>) -> Duration {
    if let Some(timeout) = explicit {
        return timeout;
    }

    if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
        match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => return Duration::from_millis(ms),
            _ => tracing::warn!("Ignoring invalid {TIMEOUT_ENV}={raw:?}"),
        }
    }

    DEFAULT_REQUEST_TIMEOUT
}
