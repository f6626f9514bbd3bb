//! Periodic heartbeat publisher.

use shared_bus::{BusMessage, MessageTransport};
use shared_types::{HeartbeatPulse, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Publishes a pulse for one service id every `pulse_interval`.
pub struct HeartbeatEmitter {
    service_id: String,
    transport: Arc<dyn MessageTransport>,
    pulse_interval: Duration,
}

impl HeartbeatEmitter {
    pub fn new(
        service_id: impl Into<String>,
        transport: Arc<dyn MessageTransport>,
        pulse_interval: Duration,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            transport,
            pulse_interval,
        }
    }

    /// Publish a single pulse stamped now.
    pub async fn pulse(&self) -> Result<usize, TransportError> {
        self.transport
            .publish(BusMessage::Heartbeat(HeartbeatPulse::now(&self.service_id)))
            .await
    }

    /// Pulse immediately, then every interval, until shutdown or the bus closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.pulse_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        debug!(service_id = %self.service_id, "Heartbeat emitter started");

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.pulse().await {
                    Ok(_) => {}
                    Err(TransportError::Closed) => {
                        info!(service_id = %self.service_id, "Bus closed, heartbeat emitter stopping");
                        break;
                    }
                    Err(e) => {
                        warn!(service_id = %self.service_id, error = %e, "Heartbeat publish failed");
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(service_id = %self.service_id, "Heartbeat emitter shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
