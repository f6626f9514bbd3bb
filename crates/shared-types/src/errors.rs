//! # Error Types
//!
//! Defines error types shared between the transport and the core.

use thiserror::Error;

/// Errors raised by the transport when publishing or subscribing.
///
/// These propagate straight to the caller of a request; the core never
/// retries them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The bus was shut down.
    #[error("Transport closed")]
    Closed,

    /// Nobody is subscribed for the destination app.
    #[error("No subscriber for destination {destination}")]
    Undeliverable { destination: String },

    /// The transport refused the message.
    #[error("Transport rejected message: {0}")]
    Rejected(String),
}
