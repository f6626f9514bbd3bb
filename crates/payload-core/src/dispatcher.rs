//! # Request Dispatcher
//!
//! Composes the correlation tracker and the transport into a single
//! send-and-await operation.
//!
//! Per request: `Created -> Dispatched -> {Completed | TimedOut | TransportFailed}`.
//! No retries happen here; retry policy belongs to the caller.

use crate::clock::millis;
use crate::settled::Settlement;
use crate::tracker::{CorrelationTracker, ResolveOutcome, TrackerError};
use serde::Serialize;
use shared_bus::{BusMessage, MessageTransport};
use shared_types::{CorrelationId, DirectMessage, StatusCode, TrackingId, TransportError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lifecycle of one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestState {
    /// Registered with the tracker.
    Created,
    /// Published to the transport.
    Dispatched,
    /// A matching response arrived.
    Completed,
    /// The deadline passed without a response.
    TimedOut,
    /// Publishing failed.
    TransportFailed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Created => "created",
            RequestState::Dispatched => "dispatched",
            RequestState::Completed => "completed",
            RequestState::TimedOut => "timed_out",
            RequestState::TransportFailed => "transport_failed",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DispatchErrorKind {
    /// No answer within the deadline.
    Unavailable,
    /// The transport refused the request.
    Transport,
}

/// Failure of [`RequestDispatcher::send_request`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No response arrived before the deadline.
    #[error("{destination} did not answer {message_name} within {timeout:?}")]
    Unavailable {
        destination: String,
        message_name: String,
        correlation_id: CorrelationId,
        timeout: Duration,
    },

    /// Publishing the request failed. Not retried.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Classification of this error.
    pub fn kind(&self) -> DispatchErrorKind {
        match self {
            DispatchError::Unavailable { .. } => DispatchErrorKind::Unavailable,
            DispatchError::Transport(_) => DispatchErrorKind::Transport,
        }
    }

    /// Status code a caller would put in a response header for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Unavailable { .. } => StatusCode::Unavailable,
            DispatchError::Transport(TransportError::Undeliverable { .. }) => {
                StatusCode::Unavailable
            }
            DispatchError::Transport(_) => StatusCode::GeneralFailure,
        }
    }
}

/// Sends requests to other apps and hands their responses back.
pub struct RequestDispatcher {
    /// App id stamped as the source of every request
    app_id: String,
    transport: Arc<dyn MessageTransport>,
    tracker: CorrelationTracker,
    /// Timeout used by `send_request_default`
    default_timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(
        app_id: impl Into<String>,
        transport: Arc<dyn MessageTransport>,
        tracker: CorrelationTracker,
        default_timeout: Duration,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            transport,
            tracker,
            default_timeout,
        }
    }

    /// Send `payload` as `message_name` to `destination` and wait for the
    /// correlated response.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Unavailable` - No response within `timeout`
    /// - `DispatchError::Transport` - Publish failed; returned without waiting
    pub async fn send_request(
        &self,
        destination: &str,
        message_name: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<DirectMessage, DispatchError> {
        let (correlation_id, handle) = self.tracker.register(timeout);
        let tracking_id = TrackingId::new();
        log_state(correlation_id, destination, message_name, RequestState::Created);

        let request = DirectMessage::request(
            &self.app_id,
            destination,
            message_name,
            tracking_id,
            correlation_id,
            payload,
        );

        if let Err(e) = self.transport.publish(BusMessage::Direct(request)).await {
            // Remove from pending before surfacing the error
            self.tracker.cancel(handle);
            log_state(
                correlation_id,
                destination,
                message_name,
                RequestState::TransportFailed,
            );
            warn!(
                correlation_id = %correlation_id,
                destination = destination,
                error = %e,
                "Publishing request failed"
            );
            return Err(DispatchError::Transport(e));
        }

        log_state(correlation_id, destination, message_name, RequestState::Dispatched);

        match self.tracker.wait(handle).await {
            Ok(response) => {
                log_state(correlation_id, destination, message_name, RequestState::Completed);
                Ok(response)
            }
            Err(TrackerError::TimedOut { timeout, .. }) => {
                log_state(correlation_id, destination, message_name, RequestState::TimedOut);
                info!(
                    correlation_id = %correlation_id,
                    destination = destination,
                    message_name = message_name,
                    timeout_ms = millis(timeout),
                    "Request unanswered, treating destination as unavailable"
                );
                Err(DispatchError::Unavailable {
                    destination: destination.to_string(),
                    message_name: message_name.to_string(),
                    correlation_id,
                    timeout,
                })
            }
        }
    }

    /// [`send_request`](Self::send_request) with the configured default timeout.
    pub async fn send_request_default(
        &self,
        destination: &str,
        message_name: &str,
        payload: serde_json::Value,
    ) -> Result<DirectMessage, DispatchError> {
        self.send_request(destination, message_name, payload, self.default_timeout)
            .await
    }

    /// Inbound hook for every direct message addressed to this app.
    ///
    /// Joins the message to its pending request by correlation id. Unknown
    /// and duplicate deliveries are dropped, never raised.
    pub fn on_envelope_received(&self, envelope: DirectMessage) -> ResolveOutcome {
        let correlation_id = envelope.correlation_id();
        let source = envelope.source_app_id.clone();
        let outcome = self.tracker.resolve(correlation_id, envelope);

        match outcome {
            ResolveOutcome::Completed => {}
            ResolveOutcome::UnknownCorrelation => {
                debug!(
                    correlation_id = %correlation_id,
                    source = %source,
                    "Dropped message with unknown correlation id"
                );
            }
            ResolveOutcome::DuplicateResolution(Settlement::TimedOut) => {
                warn!(
                    correlation_id = %correlation_id,
                    source = %source,
                    "Response arrived after its request timed out"
                );
            }
            ResolveOutcome::DuplicateResolution(settlement) => {
                debug!(
                    correlation_id = %correlation_id,
                    source = %source,
                    settled = %settlement,
                    "Dropped duplicate response"
                );
            }
        }

        outcome
    }

    /// App id this dispatcher sends as.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Timeout used by [`send_request_default`](Self::send_request_default).
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The tracker behind this dispatcher.
    pub fn tracker(&self) -> &CorrelationTracker {
        &self.tracker
    }
}

fn log_state(
    correlation_id: CorrelationId,
    destination: &str,
    message_name: &str,
    state: RequestState,
) {
    debug!(
        correlation_id = %correlation_id,
        destination = destination,
        message_name = message_name,
        state = %state,
        "Request state"
    );
}
