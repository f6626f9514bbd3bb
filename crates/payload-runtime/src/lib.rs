//! # Payload Runtime
//!
//! The demo payload app.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and load configuration
//! 2. Build the bus, registry, tracker and dispatcher
//! 3. Start the inbound router, the sweeper and this app's heartbeat
//! 4. Start the simulated host services
//! 5. Discover services and send each its request
//! 6. Shut down on completion or Ctrl-C
//!
//! ## Modules
//!
//! - `runtime` - Wiring and lifecycle
//! - `host_services` - Simulated position, sensor, link and logging services
//! - `demo` - The discovery and request flow

pub mod demo;
pub mod host_services;
pub mod runtime;

pub use demo::{Demo, DemoReport, DemoStep};
pub use runtime::PayloadRuntime;
