//! # Publisher
//!
//! Defines the transport contract and the in-memory bus that implements it.

use crate::events::{BusMessage, Topic, TopicFilter};
use crate::subscriber::{route_keys, RouteKey, RouteTable, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::TransportError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Narrow capability interface the request/response core depends on.
///
/// Anything that can publish a message and hand out filtered subscriptions
/// can stand in for the real bus, which keeps the core testable with an
/// in-memory fake.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publish a message to the bus.
    ///
    /// # Returns
    ///
    /// The number of active receivers the message was handed to.
    ///
    /// # Errors
    ///
    /// - `TransportError::Closed` - The bus was shut down
    /// - `TransportError::Undeliverable` - No subscriber for a direct message's destination
    async fn publish(&self, message: BusMessage) -> Result<usize, TransportError>;

    /// Subscribe to messages matching a filter.
    fn subscribe(&self, filter: TopicFilter) -> Result<Subscription, TransportError>;
}

/// In-memory implementation of the bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
/// Suitable for a single process; a deployment spanning hosts would put a
/// different implementation behind [`MessageTransport`].
pub struct InMemoryMessageBus {
    /// Broadcast sender for messages. Taken on close, which ends every
    /// live subscription once its backlog is drained.
    sender: RwLock<Option<broadcast::Sender<BusMessage>>>,

    /// Active subscription count by route.
    routes: RouteTable,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryMessageBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            routes: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the total number of messages published.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// True if some live subscription would receive a message for `app_id`.
    #[must_use]
    pub fn has_route(&self, app_id: &str) -> bool {
        let routes = self.routes.read();
        routes.contains_key(&RouteKey::Wildcard)
            || routes.contains_key(&RouteKey::Topic(Topic::DirectToApp(app_id.to_string())))
    }

    /// Shut the bus down. Later publishes and subscribes fail with
    /// `TransportError::Closed`; existing subscriptions end after
    /// delivering what was already published.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            debug!("Message bus closed");
        }
    }

    /// True once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageTransport for InMemoryMessageBus {
    async fn publish(&self, message: BusMessage) -> Result<usize, TransportError> {
        let Some(sender) = self.sender.read().clone() else {
            return Err(TransportError::Closed);
        };

        let topic = message.topic();

        if let BusMessage::Direct(direct) = &message {
            if !self.has_route(&direct.destination_app_id) {
                warn!(
                    topic = %topic,
                    correlation_id = %direct.correlation_id(),
                    "Direct message undeliverable (no subscriber)"
                );
                return Err(TransportError::Undeliverable {
                    destination: direct.destination_app_id.clone(),
                });
            }
        }

        self.messages_published.fetch_add(1, Ordering::Relaxed);

        match sender.send(message) {
            Ok(receiver_count) => {
                debug!(topic = %topic, receivers = receiver_count, "Message published");
                Ok(receiver_count)
            }
            Err(_) => {
                // No receivers at all - heartbeats are allowed to fall on the floor
                debug!(topic = %topic, "Message dropped (no receivers)");
                Ok(0)
            }
        }
    }

    fn subscribe(&self, filter: TopicFilter) -> Result<Subscription, TransportError> {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(TransportError::Closed);
        };

        let receiver = sender.subscribe();
        {
            let mut routes = self.routes.write();
            for key in route_keys(&filter) {
                *routes.entry(key).or_insert(0) += 1;
            }
        }

        debug!(topics = ?filter.topics, "New subscription created");

        Ok(Subscription::new(receiver, filter, self.routes.clone()))
    }
}
