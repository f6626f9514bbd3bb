//! # Payload Telemetry
//!
//! Structured logging for payload apps on top of `tracing-subscriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use payload_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PAYLOAD_SERVICE_NAME` | `payload-app` | Service name on every line |
//! | `PAYLOAD_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `PAYLOAD_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `PAYLOAD_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_telemetry};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    SubscriberInit(String),
}

/// Convenience macro for creating a span carrying the app id.
///
/// # Example
///
/// ```rust,ignore
/// use payload_telemetry::app_span;
///
/// let _span = app_span!("demo_flow", app_id = "starter-app").entered();
/// ```
#[macro_export]
macro_rules! app_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
