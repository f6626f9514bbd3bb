//! # Shared Bus - Topic-Based Message Transport
//!
//! The publish/subscribe collaborator underneath the request/response core.
//!
//! ## Rules
//!
//! - Apps only talk to each other through the bus.
//! - Every request and response travels as a `DirectMessage` on the
//!   `DirectToApp(destination)` topic.
//! - Liveness pulses travel on the `Heartbeat` topic.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Payload App  │                    │ Host Service │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │ Message Bus  │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! The bus does not interpret payloads and does not retry.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{BusMessage, Topic, TopicFilter};
pub use publisher::{InMemoryMessageBus, MessageTransport};
pub use shared_types::TransportError;
pub use subscriber::{MessageStream, Subscription, SubscriptionError};

/// Maximum messages to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
