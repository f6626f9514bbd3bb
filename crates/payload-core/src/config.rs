//! Core configuration with validation.
//!
//! Defaults mirror the host platform's heartbeat settings: services pulse
//! every 2s and a pulse is trusted for a further 10s.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main configuration for the request/response core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// App id this process answers to on the bus.
    pub app_id: String,
    /// Timeout used when a caller does not pick one.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Heartbeat settings
    pub heartbeat: HeartbeatConfig,
    /// Pending-request bookkeeping
    pub tracker: TrackerConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_id: "payload-app".to_string(),
            request_timeout: Duration::from_secs(30),
            heartbeat: HeartbeatConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PAYLOAD_APP_ID`: App id (default: payload-app)
    /// - `PAYLOAD_REQUEST_TIMEOUT_MS`: Default request timeout (default: 30000)
    /// - `HEARTBEAT_PULSE_TIMING_MS`: Pulse interval (default: 2000)
    /// - `HEARTBEAT_RECEIVED_TOLERANCE_MS`: Extra age a pulse is trusted for (default: 10000)
    /// - `PAYLOAD_SWEEP_INTERVAL_MS`: Expired-request sweep interval (default: 1000)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            app_id: env::var("PAYLOAD_APP_ID").unwrap_or(defaults.app_id),
            request_timeout: env_millis("PAYLOAD_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            heartbeat: HeartbeatConfig {
                pulse_interval: env_millis("HEARTBEAT_PULSE_TIMING_MS")
                    .unwrap_or(defaults.heartbeat.pulse_interval),
                received_tolerance: env_millis("HEARTBEAT_RECEIVED_TOLERANCE_MS")
                    .unwrap_or(defaults.heartbeat.received_tolerance),
            },
            tracker: TrackerConfig {
                sweep_interval: env_millis("PAYLOAD_SWEEP_INTERVAL_MS")
                    .unwrap_or(defaults.tracker.sweep_interval),
                settled_retention: defaults.tracker.settled_retention,
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid("app_id cannot be empty".into()));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }

        if self.heartbeat.pulse_interval.is_zero() {
            return Err(ConfigError::InvalidHeartbeat(
                "pulse_interval cannot be 0".into(),
            ));
        }

        if self.tracker.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Heartbeat timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// How often a service emits a pulse.
    #[serde(with = "duration_serde")]
    pub pulse_interval: Duration,
    /// How much longer than one interval a pulse is still trusted.
    #[serde(with = "duration_serde")]
    pub received_tolerance: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            pulse_interval: Duration::from_secs(2),
            received_tolerance: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Maximum age of the last pulse for a service to count as online.
    pub fn staleness_window(&self) -> Duration {
        self.pulse_interval + self.received_tolerance
    }
}

/// Pending-request bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How often the backstop sweep removes expired entries.
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,
    /// How long a settled correlation id is remembered for classifying
    /// late deliveries.
    #[serde(with = "duration_serde")]
    pub settled_retention: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            settled_retention: Duration::from_secs(120),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid heartbeat timing
    #[error("invalid heartbeat: {0}")]
    InvalidHeartbeat(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Duration serde as `"<n>ms"`, `"<n>s"`, `"<n>m"` or plain seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before "m" and "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
