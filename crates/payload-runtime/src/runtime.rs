//! Wiring of the request/response core onto an in-memory bus.

use anyhow::{Context, Result};
use payload_core::{
    millis, sweeper_task, CoreConfig, CorrelationTracker, HeartbeatEmitter, HeartbeatRegistry,
    InboundRouter, RequestDispatcher,
};
use shared_bus::InMemoryMessageBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::demo::{Demo, DemoReport};
use crate::host_services;

/// How long shutdown waits for background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The payload app runtime.
pub struct PayloadRuntime {
    config: CoreConfig,
    bus: Arc<InMemoryMessageBus>,
    registry: Arc<HeartbeatRegistry>,
    dispatcher: Arc<RequestDispatcher>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PayloadRuntime {
    /// Build the core. Nothing runs until [`start`](Self::start).
    pub fn new(config: CoreConfig) -> Self {
        info!(app_id = %config.app_id, "Creating payload runtime");

        let bus = Arc::new(InMemoryMessageBus::new());
        let registry = Arc::new(HeartbeatRegistry::new(config.heartbeat.staleness_window()));
        let tracker = CorrelationTracker::new(config.tracker.settled_retention);
        let dispatcher = Arc::new(RequestDispatcher::new(
            config.app_id.clone(),
            bus.clone(),
            tracker,
            config.request_timeout,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            bus,
            registry,
            dispatcher,
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        }
    }

    /// Start the router, the expired-request sweeper and this app's heartbeat.
    pub fn start(&mut self) -> Result<()> {
        let router = InboundRouter::new(
            self.bus.clone(),
            self.dispatcher.clone(),
            self.registry.clone(),
        )
        .spawn(self.shutdown_rx.clone())
        .context("Failed to subscribe inbound router")?;
        self.tasks.push(router);

        let tracker = self.dispatcher.tracker().clone();
        let interval = self.config.tracker.sweep_interval;
        let mut sweeper_shutdown = self.shutdown_rx.clone();
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = sweeper_task(tracker, interval) => {}
                _ = sweeper_shutdown.changed() => {
                    debug!("Sweeper shutting down");
                }
            }
        }));

        self.tasks.push(
            HeartbeatEmitter::new(
                self.config.app_id.clone(),
                self.bus.clone(),
                self.config.heartbeat.pulse_interval,
            )
            .spawn(self.shutdown_rx.clone()),
        );

        info!(
            app_id = %self.config.app_id,
            request_timeout_ms = millis(self.config.request_timeout),
            staleness_window_ms = millis(self.config.heartbeat.staleness_window()),
            "Payload runtime started"
        );
        Ok(())
    }

    /// Start the simulated host services.
    pub fn start_host_services(&mut self) -> Result<()> {
        let tasks = host_services::spawn_all(
            self.bus.clone(),
            self.config.heartbeat.pulse_interval,
            self.shutdown_rx.clone(),
        )
        .context("Failed to start simulated host services")?;
        self.tasks.extend(tasks);
        Ok(())
    }

    /// Discover host services and send each one its request.
    ///
    /// Discovery waits up to one staleness window; stragglers get one pulse
    /// interval to show up.
    pub async fn run_demo(&self) -> DemoReport {
        Demo::new(&self.dispatcher, &self.registry, self.config.request_timeout)
            .run(
                self.config.heartbeat.staleness_window(),
                self.config.heartbeat.pulse_interval,
            )
            .await
    }

    /// Signal shutdown, close the bus and wait for background tasks.
    pub async fn shutdown(self) {
        info!("Shutting down payload runtime");
        let _ = self.shutdown_tx.send(true);
        self.bus.close();

        let stats = self.dispatcher.tracker().stats().snapshot();
        info!(?stats, "Final request statistics");

        for task in self.tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Background task failed"),
                Err(_) => warn!("Background task did not stop in time"),
            }
        }
        info!("Payload runtime stopped");
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<InMemoryMessageBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<HeartbeatRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }
}
