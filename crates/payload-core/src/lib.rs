//! # Payload Core
//!
//! Correlation-based request/response over the message bus, plus
//! heartbeat-driven service discovery.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`HeartbeatRegistry`] | Last pulse per service, online/offline queries |
//! | [`CorrelationTracker`] | Outstanding requests keyed by correlation id |
//! | [`RequestDispatcher`] | Send a request and await its correlated response |
//! | [`InboundRouter`] | Feeds bus traffic to the dispatcher and registry |
//! | [`HeartbeatEmitter`] | Makes this app discoverable |
//!
//! ## Data Flow
//!
//! ```text
//! caller -> RequestDispatcher::send_request -> transport.publish
//! transport -> InboundRouter -> RequestDispatcher::on_envelope_received
//!           -> CorrelationTracker::resolve -> waiting caller wakes
//! transport -> InboundRouter -> HeartbeatRegistry::record
//! ```
//!
//! Both the registry and the tracker are in-memory and reset on restart.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod emitter;
pub mod heartbeat;
pub mod router;
pub mod settled;
pub mod tracker;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use clock::{millis, SystemTimeSource, TimeSource};
pub use config::{ConfigError, CoreConfig, HeartbeatConfig, TrackerConfig};
pub use dispatcher::{DispatchError, DispatchErrorKind, RequestDispatcher, RequestState};
pub use emitter::HeartbeatEmitter;
pub use heartbeat::HeartbeatRegistry;
pub use router::InboundRouter;
pub use settled::{SettledCache, Settlement};
pub use tracker::{
    sweeper_task, CorrelationTracker, ResolveOutcome, TrackerError, TrackerStats,
    TrackerStatsSnapshot, WaitHandle,
};
