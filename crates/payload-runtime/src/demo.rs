//! The starter-app flow: discover host services, then talk to each one.

use crate::host_services::{LINK_SERVICE, LOGGING_SERVICE, POSITION_SERVICE, SENSOR_SERVICE};
use payload_core::{HeartbeatRegistry, RequestDispatcher};
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::{DirectMessage, StatusCode};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one request made by the demo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoStep {
    pub service: String,
    pub message_name: String,
    pub status: StatusCode,
    pub detail: String,
}

/// Everything the demo saw and did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DemoReport {
    /// Services online when the demo looked.
    pub discovered: Vec<String>,
    pub steps: Vec<DemoStep>,
}

impl DemoReport {
    /// Status of the first request named `message_name`.
    pub fn status_of(&self, message_name: &str) -> Option<StatusCode> {
        self.steps
            .iter()
            .find(|step| step.message_name == message_name)
            .map(|step| step.status)
    }

    /// True if every request succeeded.
    pub fn all_successful(&self) -> bool {
        self.steps.iter().all(|step| step.status.is_success())
    }
}

/// Drives the demo against a running core.
pub struct Demo<'a> {
    dispatcher: &'a RequestDispatcher,
    registry: &'a HeartbeatRegistry,
    request_timeout: Duration,
    report: DemoReport,
}

impl<'a> Demo<'a> {
    pub fn new(
        dispatcher: &'a RequestDispatcher,
        registry: &'a HeartbeatRegistry,
        request_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            request_timeout,
            report: DemoReport::default(),
        }
    }

    /// Wait up to `discovery_window` for host services, give stragglers one
    /// `settle` period to pulse, then exercise every service found.
    pub async fn run(mut self, discovery_window: Duration, settle: Duration) -> DemoReport {
        let Some(first) = self
            .registry
            .wait_for_service("hostsvc-", discovery_window)
            .await
        else {
            warn!("No host services discovered");
            return self.report;
        };
        info!(service = %first, "First host service discovered");

        tokio::time::sleep(settle).await;
        self.report.discovered = self.registry.filter_by_pattern("hostsvc-");
        info!(services = ?self.report.discovered, "Host services online");

        for service in self.report.discovered.clone() {
            match service.as_str() {
                POSITION_SERVICE => self.position().await,
                SENSOR_SERVICE => self.sensor_tasking().await,
                LINK_SERVICE => self.file_transfer().await,
                LOGGING_SERVICE => self.log_message().await,
                other => info!(service = other, "No demo step for service"),
            }
        }

        info!(
            requests = self.report.steps.len(),
            all_successful = self.report.all_successful(),
            "Demo finished"
        );
        self.report
    }

    async fn position(&mut self) {
        self.call(POSITION_SERVICE, "PositionRequest", json!({})).await;
    }

    async fn sensor_tasking(&mut self) {
        let Some(available) = self
            .call(SENSOR_SERVICE, "SensorsAvailableRequest", json!({}))
            .await
        else {
            return;
        };

        let Some(sensor_id) = available.payload["sensors"]
            .as_array()
            .and_then(|sensors| sensors.first())
            .and_then(|sensor| sensor["sensor_id"].as_str())
            .map(str::to_string)
        else {
            info!("No sensors available, skipping tasking");
            return;
        };

        let Some(precheck) = self
            .call(
                SENSOR_SERVICE,
                "TaskingPreCheckRequest",
                json!({ "sensor_id": sensor_id }),
            )
            .await
        else {
            return;
        };

        if precheck.payload["sensor_available"].as_bool() != Some(true) {
            info!(sensor_id = %sensor_id, "Sensor not ready, skipping tasking");
            return;
        }

        self.call(
            SENSOR_SERVICE,
            "TaskingRequest",
            json!({ "sensor_id": sensor_id }),
        )
        .await;
    }

    async fn file_transfer(&mut self) {
        self.call(
            LINK_SERVICE,
            "LinkRequest",
            json!({ "file_name": "/test/file.txt" }),
        )
        .await;
    }

    async fn log_message(&mut self) {
        self.call(
            LOGGING_SERVICE,
            "LogMessage",
            json!({ "level": "Info", "message": "Hello from the payload app" }),
        )
        .await;
    }

    /// Send one request and record its outcome.
    ///
    /// Returns the response only if it was successful.
    async fn call(
        &mut self,
        service: &str,
        message_name: &str,
        payload: Value,
    ) -> Option<DirectMessage> {
        let result = self
            .dispatcher
            .send_request(service, message_name, payload, self.request_timeout)
            .await;

        let (status, detail, response) = match result {
            Ok(response) => (
                response.status(),
                response.header.message.clone(),
                Some(response),
            ),
            Err(e) => (e.status(), e.to_string(), None),
        };

        if status.is_success() {
            info!(service = service, message_name = message_name, "Request succeeded");
        } else {
            warn!(
                service = service,
                message_name = message_name,
                status = ?status,
                detail = %detail,
                "Request failed"
            );
        }

        self.report.steps.push(DemoStep {
            service: service.to_string(),
            message_name: message_name.to_string(),
            status,
            detail,
        });

        response.filter(|r| r.status().is_success())
    }
}
