//! Wall-clock abstraction used for heartbeat staleness checks.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of "now" for liveness decisions.
///
/// Pulses carry wall-clock timestamps, so staleness is measured against a
/// wall clock too. Tests swap in a manually advanced clock.
pub trait TimeSource: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production time source backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Whole milliseconds in `duration` for log fields, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
