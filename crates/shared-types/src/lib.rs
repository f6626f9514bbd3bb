//! # Shared Types Crate
//!
//! This crate contains the envelope model exchanged between a payload app
//! and the services it talks to over the message bus.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Every crate uses these types for headers
//!   and envelopes; nothing re-declares them.
//! - **Opaque Payloads**: The core only reads the header. Payload contents
//!   belong to the service that defines them.
//! - **Join Key**: `correlation_id` is shared by a request and its response;
//!   `tracking_id` identifies a single message instance.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod ids;

pub use entities::*;
pub use envelope::DirectMessage;
pub use errors::*;
pub use ids::{CorrelationId, TrackingId};
