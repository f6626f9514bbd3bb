//! Payload app entry point.

use anyhow::{Context, Result};
use payload_core::CoreConfig;
use payload_runtime::PayloadRuntime;
use payload_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = CoreConfig::from_env();
    init_telemetry(&TelemetryConfig::for_app(&config.app_id))
        .context("Failed to initialize logging")?;

    config.validate().context("Invalid configuration")?;

    let mut runtime = PayloadRuntime::new(config);
    runtime.start()?;
    runtime.start_host_services()?;

    tokio::select! {
        report = runtime.run_demo() => {
            if report.all_successful() {
                info!(requests = report.steps.len(), "All requests succeeded");
            } else {
                warn!(steps = ?report.steps, "Some requests failed");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted");
        }
    }

    runtime.shutdown().await;
    Ok(())
}
