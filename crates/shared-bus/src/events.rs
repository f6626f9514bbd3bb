//! # Bus Messages
//!
//! Defines what flows through the bus and how subscribers select it.

use serde::{Deserialize, Serialize};
use shared_types::{DirectMessage, HeartbeatPulse};
use std::fmt;

/// Everything that can be published to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusMessage {
    /// A liveness pulse from a service.
    Heartbeat(HeartbeatPulse),

    /// A request or response addressed to one app.
    Direct(DirectMessage),
}

impl BusMessage {
    /// Topic this message is published on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            BusMessage::Heartbeat(_) => Topic::Heartbeat,
            BusMessage::Direct(msg) => Topic::DirectToApp(msg.destination_app_id.clone()),
        }
    }

    /// App id of whoever produced the message.
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            BusMessage::Heartbeat(pulse) => &pulse.service_id,
            BusMessage::Direct(msg) => &msg.source_app_id,
        }
    }
}

/// Topics on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Liveness pulses from every service.
    Heartbeat,
    /// Messages addressed to a single app id.
    DirectToApp(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Heartbeat => write!(f, "heartbeat"),
            Topic::DirectToApp(app_id) => write!(f, "direct.{}", app_id),
        }
    }
}

/// Subscription filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<Topic>,
}

impl TopicFilter {
    /// Create a filter that accepts all messages.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<Topic>) -> Self {
        Self { topics }
    }

    /// Messages addressed to `app_id` only.
    #[must_use]
    pub fn direct(app_id: impl Into<String>) -> Self {
        Self::topics(vec![Topic::DirectToApp(app_id.into())])
    }

    /// Heartbeat pulses only.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::topics(vec![Topic::Heartbeat])
    }

    /// True if the filter accepts every topic.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.topics.is_empty()
    }

    /// Check if a message matches this filter.
    #[must_use]
    pub fn matches(&self, message: &BusMessage) -> bool {
        self.is_wildcard() || self.topics.contains(&message.topic())
    }
}
