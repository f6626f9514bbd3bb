//! # Subscriber
//!
//! Defines the subscription side of the bus.

use crate::events::{BusMessage, Topic, TopicFilter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was closed.
    #[error("Message bus closed")]
    Closed,
}

/// Key under which live subscriptions are counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RouteKey {
    /// A subscription with an empty filter.
    Wildcard,
    /// A subscription to one topic.
    Topic(Topic),
}

/// Live subscription counts, shared by the bus and its subscriptions.
pub(crate) type RouteTable = Arc<RwLock<HashMap<RouteKey, usize>>>;

pub(crate) fn route_keys(filter: &TopicFilter) -> Vec<RouteKey> {
    if filter.is_wildcard() {
        vec![RouteKey::Wildcard]
    } else {
        filter.topics.iter().cloned().map(RouteKey::Topic).collect()
    }
}

/// Removes a subscription's routes when dropped.
struct RouteGuard {
    routes: RouteTable,
    keys: Vec<RouteKey>,
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        let mut routes = self.routes.write();
        for key in &self.keys {
            let Some(count) = routes.get_mut(key) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count == 0 {
                routes.remove(key);
            }
        }
        debug!(routes = ?self.keys, "Subscription dropped");
    }
}

/// A subscription handle for receiving messages.
///
/// When dropped, the subscription is automatically cleaned up and its
/// topics stop counting as routable.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<BusMessage>,

    /// Filter for this subscription.
    filter: TopicFilter,

    /// Route bookkeeping (for cleanup).
    guard: RouteGuard,
}

impl Subscription {
    /// Create a new subscription. Routes must already be counted.
    pub(crate) fn new(
        receiver: broadcast::Receiver<BusMessage>,
        filter: TopicFilter,
        routes: RouteTable,
    ) -> Self {
        let keys = route_keys(&filter);
        Self {
            receiver,
            filter,
            guard: RouteGuard { routes, keys },
        }
    }

    /// Receive the next message that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next matching message
    /// - `None` - The bus was closed or dropped
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some messages dropped");
                    continue;
                }
            };

            if self.filter.matches(&message) {
                return Some(message);
            }
        }
    }

    /// Try to receive the next message without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(message))` - A message was available and matched
    /// - `Ok(None)` - No message available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<BusMessage>, SubscriptionError> {
        loop {
            let message = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&message) {
                return Ok(Some(message));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// Turn this subscription into a `Stream`.
    #[must_use]
    pub fn into_stream(self) -> MessageStream {
        MessageStream {
            inner: BroadcastStream::new(self.receiver),
            filter: self.filter,
            _guard: self.guard,
        }
    }
}

/// A stream of filtered bus messages.
///
/// Wakes only when the underlying channel has something new.
pub struct MessageStream {
    inner: BroadcastStream<BusMessage>,
    filter: TopicFilter,
    _guard: RouteGuard,
}

impl MessageStream {
    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }
}

impl Stream for MessageStream {
    type Item = BusMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => {
                    if this.filter.matches(&message) {
                        return Poll::Ready(Some(message));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Stream lagged, some messages dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
