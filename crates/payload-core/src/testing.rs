//! Centralized Testing Utilities
//!
//! Test helpers, fakes and fixtures shared by this crate's tests and by the
//! integration test crate. Available with the `test-utils` feature flag.

use crate::clock::TimeSource;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use shared_bus::{BusMessage, MessageTransport, Subscription, TopicFilter};
use shared_types::{DirectMessage, StatusCode, TransportError};
use std::sync::Arc;
use std::time::Duration;

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a registry and the test driving it
/// see identical time.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualTimeSource {
    /// Start at the current wall-clock time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Start at a fixed instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.now.lock();
        *now = *now + by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Transport whose publishes always fail with the configured error.
///
/// Subscriptions are served by an inner bus so inbound wiring still works.
pub struct FailingTransport {
    error: TransportError,
    inner: shared_bus::InMemoryMessageBus,
}

impl FailingTransport {
    /// Fail every publish with `error`.
    pub fn new(error: TransportError) -> Self {
        Self {
            error,
            inner: shared_bus::InMemoryMessageBus::new(),
        }
    }
}

#[async_trait]
impl MessageTransport for FailingTransport {
    async fn publish(&self, _message: BusMessage) -> Result<usize, TransportError> {
        Err(self.error.clone())
    }

    fn subscribe(&self, filter: TopicFilter) -> Result<Subscription, TransportError> {
        self.inner.subscribe(filter)
    }
}

/// Spawn a responder that answers every request addressed to `app_id` with a
/// successful reply echoing the request payload.
///
/// The reply's message name is the request's with `Request` replaced by
/// `Response`. The task ends when the bus closes.
pub fn spawn_echo_responder(
    transport: Arc<dyn MessageTransport>,
    app_id: &str,
) -> Result<tokio::task::JoinHandle<()>, TransportError> {
    let mut subscription = transport.subscribe(TopicFilter::direct(app_id))?;

    Ok(tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            let BusMessage::Direct(request) = message else {
                continue;
            };
            let reply = DirectMessage::reply(
                &request,
                request.message_name.replace("Request", "Response"),
                StatusCode::Successful,
                "Success",
                request.payload.clone(),
            );
            if transport.publish(BusMessage::Direct(reply)).await.is_err() {
                break;
            }
        }
    }))
}
