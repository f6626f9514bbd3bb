//! # Core Entities
//!
//! Status codes, the response header and heartbeat pulses.
//!
//! ## Clusters
//!
//! - **Headers**: `StatusCode`, `ResponseHeader`
//! - **Liveness**: `HeartbeatPulse`

use crate::ids::{CorrelationId, TrackingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CLUSTER A: HEADERS
// =============================================================================

/// Outcome status carried in every response header.
///
/// The service domain defines the full set. The core itself only tells
/// success from failure, and maps "no answer within deadline" to
/// [`StatusCode::Unavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// The request was handled.
    Successful,
    /// Caller is not authenticated.
    Unauthorized,
    /// Caller is not allowed to perform the request.
    Forbidden,
    /// The addressed resource does not exist.
    NotFound,
    /// Unspecified failure.
    GeneralFailure,
    /// Header of an outbound request (not yet answered).
    Request,
    /// Accepted, result will follow later.
    Pending,
    /// The service refused the request.
    Rejected,
    /// A request field was malformed.
    InvalidArgument,
    /// The service itself timed out.
    Timeout,
    /// No answer, or the service is not reachable.
    Unavailable,
    /// A referenced file does not exist.
    FileNotFound,
    /// The service failed internally.
    InternalServerError,
    /// Status could not be determined.
    Unknown,
}

impl StatusCode {
    /// Returns true for [`StatusCode::Successful`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Successful)
    }

    /// Returns true for statuses that terminate a request without success.
    ///
    /// `Request` and `Pending` are in-flight markers, not failures.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            StatusCode::Successful | StatusCode::Request | StatusCode::Pending
        )
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Unknown
    }
}

/// Header shared by every request and response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// Identifies this message instance.
    pub tracking_id: TrackingId,
    /// Join key between a request and its response.
    pub correlation_id: CorrelationId,
    /// Outcome status.
    pub status: StatusCode,
    /// Human-readable detail, empty on plain requests.
    pub message: String,
}

impl ResponseHeader {
    /// Header for an outbound request.
    pub fn request(tracking_id: TrackingId, correlation_id: CorrelationId) -> Self {
        Self {
            tracking_id,
            correlation_id,
            status: StatusCode::Request,
            message: String::new(),
        }
    }

    /// Successful response header for the given correlation id.
    pub fn success(correlation_id: CorrelationId) -> Self {
        Self {
            tracking_id: TrackingId::new(),
            correlation_id,
            status: StatusCode::Successful,
            message: "Success".to_string(),
        }
    }

    /// Failed response header for the given correlation id.
    pub fn failure(
        correlation_id: CorrelationId,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tracking_id: TrackingId::new(),
            correlation_id,
            status,
            message: message.into(),
        }
    }

    /// Returns true if the status is [`StatusCode::Successful`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

// =============================================================================
// CLUSTER B: LIVENESS
// =============================================================================

/// Periodic liveness signal emitted by a service.
///
/// Ephemeral: one per pulse event, never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPulse {
    /// Identifier of the emitting service (its app id).
    pub service_id: String,
    /// Emission time reported by the service.
    pub observed_at: DateTime<Utc>,
}

impl HeartbeatPulse {
    /// Create a pulse with an explicit timestamp.
    pub fn new(service_id: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            service_id: service_id.into(),
            observed_at,
        }
    }

    /// Create a pulse stamped with the current wall-clock time.
    pub fn now(service_id: impl Into<String>) -> Self {
        Self::new(service_id, Utc::now())
    }
}
