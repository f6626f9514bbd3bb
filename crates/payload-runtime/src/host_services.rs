//! Simulated host platform services.
//!
//! Each service pulses on the heartbeat topic and answers the requests the
//! real host platform would, with canned payloads. Enough to exercise
//! discovery and request/response end to end without a spacecraft.

use chrono::{Duration as ChronoDuration, Utc};
use payload_core::HeartbeatEmitter;
use serde_json::{json, Value};
use shared_bus::{BusMessage, MessageTransport, TopicFilter};
use shared_types::{DirectMessage, StatusCode, TransportError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// App id of the simulated position service.
pub const POSITION_SERVICE: &str = "hostsvc-position";
/// App id of the simulated sensor service.
pub const SENSOR_SERVICE: &str = "hostsvc-sensor";
/// App id of the simulated file transfer service.
pub const LINK_SERVICE: &str = "hostsvc-link";
/// App id of the simulated logging service.
pub const LOGGING_SERVICE: &str = "hostsvc-logging";

/// Earth's equatorial radius in meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// The host services started by [`spawn_all`].
pub const ALL_SERVICES: [&str; 4] = [
    POSITION_SERVICE,
    SENSOR_SERVICE,
    LINK_SERVICE,
    LOGGING_SERVICE,
];

/// One simulated host service.
pub struct HostService {
    app_id: &'static str,
    transport: Arc<dyn MessageTransport>,
    /// Files the link service can transfer
    files: HashSet<String>,
}

impl HostService {
    pub fn new(app_id: &'static str, transport: Arc<dyn MessageTransport>) -> Self {
        let files = ["/test/file.txt", "/data/outbox/telemetry.csv"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            app_id,
            transport,
            files,
        }
    }

    /// Build the reply to `request`.
    pub fn handle(&self, request: &DirectMessage) -> DirectMessage {
        let (name, status, message, payload) = match request.message_name.as_str() {
            "PositionRequest" => (
                "PositionResponse",
                StatusCode::Successful,
                "Success",
                json!({
                    "position_time": Utc::now(),
                    "point": { "x": EARTH_RADIUS_M, "y": 0.0, "z": 0.0 },
                }),
            ),
            "SensorsAvailableRequest" => (
                "SensorsAvailableResponse",
                StatusCode::Successful,
                "Success",
                json!({
                    "sensors": [
                        { "sensor_id": "camera-1", "description": "Optical Camera" },
                        { "sensor_id": "thermal-1", "description": "Thermal Sensor" },
                    ]
                }),
            ),
            "TaskingPreCheckRequest" => {
                let sensor_id = str_field(&request.payload, "sensor_id");
                (
                    "TaskingPreCheckResponse",
                    StatusCode::Successful,
                    "Success",
                    json!({ "sensor_id": sensor_id, "sensor_available": is_known_sensor(sensor_id) }),
                )
            }
            "TaskingRequest" => {
                let sensor_id = str_field(&request.payload, "sensor_id");
                if is_known_sensor(sensor_id) {
                    let now = Utc::now();
                    (
                        "TaskingResponse",
                        StatusCode::Successful,
                        "Success",
                        json!({
                            "sensor_id": sensor_id,
                            "sensor_data": {
                                "generated_time": now,
                                "expiration_time": now + ChronoDuration::minutes(10),
                                "data": "test-sensor-data",
                            }
                        }),
                    )
                } else {
                    (
                        "TaskingResponse",
                        StatusCode::NotFound,
                        "Sensor not found",
                        json!({ "sensor_id": sensor_id }),
                    )
                }
            }
            "LinkRequest" => {
                let file_name = str_field(&request.payload, "file_name");
                if self.files.contains(file_name) {
                    (
                        "LinkResponse",
                        StatusCode::Successful,
                        "Success",
                        json!({ "file_name": file_name }),
                    )
                } else {
                    (
                        "LinkResponse",
                        StatusCode::FileNotFound,
                        "File not found",
                        json!({ "file_name": file_name }),
                    )
                }
            }
            "LogMessage" => {
                info!(
                    target: "hostsvc_logging",
                    log_level = str_field(&request.payload, "level"),
                    log_message = str_field(&request.payload, "message"),
                    "Payload log"
                );
                ("LogMessageResponse", StatusCode::Successful, "Success", Value::Null)
            }
            other => {
                warn!(service = self.app_id, message_name = other, "Unsupported request");
                (
                    "ErrorResponse",
                    StatusCode::InvalidArgument,
                    "Unsupported message",
                    Value::Null,
                )
            }
        };

        DirectMessage::reply(request, name, status, message, payload)
    }

    /// Answer requests until shutdown or the bus closes.
    ///
    /// Subscribes before returning, so requests sent right after are seen.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>, TransportError> {
        let mut requests = self.transport.subscribe(TopicFilter::direct(self.app_id))?;

        Ok(tokio::spawn(async move {
            debug!(service = self.app_id, "Host service started");
            loop {
                tokio::select! {
                    message = requests.recv() => {
                        let Some(BusMessage::Direct(request)) = message else {
                            break;
                        };
                        let reply = self.handle(&request);
                        if let Err(e) = self.transport.publish(BusMessage::Direct(reply)).await {
                            warn!(service = self.app_id, error = %e, "Failed to publish reply");
                            if e == TransportError::Closed {
                                break;
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(service = self.app_id, "Host service stopped");
        }))
    }
}

/// Start every simulated host service with its heartbeat emitter.
pub fn spawn_all(
    transport: Arc<dyn MessageTransport>,
    pulse_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, TransportError> {
    let mut tasks = Vec::with_capacity(ALL_SERVICES.len() * 2);

    for app_id in ALL_SERVICES {
        tasks.push(HostService::new(app_id, transport.clone()).spawn(shutdown.clone())?);
        tasks.push(
            HeartbeatEmitter::new(app_id, transport.clone(), pulse_interval)
                .spawn(shutdown.clone()),
        );
    }

    info!(services = ?ALL_SERVICES, "Simulated host services started");
    Ok(tasks)
}

fn str_field<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn is_known_sensor(sensor_id: &str) -> bool {
    matches!(sensor_id, "camera-1" | "thermal-1")
}
