//! # `DirectMessage` Envelope
//!
//! The unit exchanged with the transport for every request and response.
//!
//! ## Properties
//!
//! - **Correlation**: A response copies the request's `correlation_id`.
//! - **Fresh Tracking**: Every message, request or response, gets its own
//!   `tracking_id`.
//! - **Opaque Payload**: The payload is carried as JSON and never inspected
//!   by the request/response core.

use crate::entities::{ResponseHeader, StatusCode};
use crate::ids::{CorrelationId, TrackingId};
use serde::{Deserialize, Serialize};

/// Envelope addressed to a single app on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    // =========================================================================
    // ROUTING SECTION
    // =========================================================================
    /// App id of the sender. Responses are addressed back to it.
    pub source_app_id: String,

    /// App id of the intended recipient.
    pub destination_app_id: String,

    /// Name of the message type (e.g. `PositionRequest`).
    pub message_name: String,

    // =========================================================================
    // HEADER SECTION
    // =========================================================================
    /// Tracking id, correlation id, status and detail message.
    pub header: ResponseHeader,

    // =========================================================================
    // PAYLOAD SECTION
    // =========================================================================
    /// Service-defined payload.
    pub payload: serde_json::Value,
}

impl DirectMessage {
    /// Build an outbound request envelope.
    pub fn request(
        source_app_id: impl Into<String>,
        destination_app_id: impl Into<String>,
        message_name: impl Into<String>,
        tracking_id: TrackingId,
        correlation_id: CorrelationId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            source_app_id: source_app_id.into(),
            destination_app_id: destination_app_id.into(),
            message_name: message_name.into(),
            header: ResponseHeader::request(tracking_id, correlation_id),
            payload,
        }
    }

    /// Build the response to `request`.
    ///
    /// The response travels back to the requester, keeps the request's
    /// correlation id and gets a fresh tracking id.
    pub fn reply(
        request: &DirectMessage,
        message_name: impl Into<String>,
        status: StatusCode,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            source_app_id: request.destination_app_id.clone(),
            destination_app_id: request.source_app_id.clone(),
            message_name: message_name.into(),
            header: ResponseHeader {
                tracking_id: TrackingId::new(),
                correlation_id: request.header.correlation_id,
                status,
                message: message.into(),
            },
            payload,
        }
    }

    /// The join key of this envelope.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.header.correlation_id
    }

    /// The tracking id of this envelope.
    #[must_use]
    pub fn tracking_id(&self) -> TrackingId {
        self.header.tracking_id
    }

    /// Status carried in the header.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.header.status
    }
}
