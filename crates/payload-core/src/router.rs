//! Inbound message router.
//!
//! Subscribes to this app's direct topic and to heartbeats, then feeds the
//! dispatcher and the registry until shutdown or until the bus goes away.

use crate::dispatcher::RequestDispatcher;
use crate::heartbeat::HeartbeatRegistry;
use futures::StreamExt;
use shared_bus::{BusMessage, MessageTransport, Topic, TopicFilter};
use shared_types::TransportError;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Routes inbound bus traffic to the request/response core.
pub struct InboundRouter {
    transport: Arc<dyn MessageTransport>,
    dispatcher: Arc<RequestDispatcher>,
    registry: Arc<HeartbeatRegistry>,
}

impl InboundRouter {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        dispatcher: Arc<RequestDispatcher>,
        registry: Arc<HeartbeatRegistry>,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            registry,
        }
    }

    /// Subscribe and spawn the routing loop.
    ///
    /// Subscribing happens before this returns, so responses to requests
    /// sent afterwards cannot be missed.
    pub fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<tokio::task::JoinHandle<()>, TransportError> {
        let filter = TopicFilter::topics(vec![
            Topic::DirectToApp(self.dispatcher.app_id().to_string()),
            Topic::Heartbeat,
        ]);
        let stream = self.transport.subscribe(filter)?.into_stream();

        Ok(tokio::spawn(self.run(stream, shutdown)))
    }

    async fn run(self, mut stream: shared_bus::MessageStream, mut shutdown: watch::Receiver<bool>) {
        info!(app_id = %self.dispatcher.app_id(), "Inbound router started");

        loop {
            tokio::select! {
                message = stream.next() => match message {
                    Some(message) => self.route(message),
                    None => {
                        warn!("Message stream ended, inbound router stopping");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Inbound router shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn route(&self, message: BusMessage) {
        match message {
            BusMessage::Heartbeat(pulse) => self.registry.record(pulse),
            BusMessage::Direct(envelope) => {
                debug!(
                    correlation_id = %envelope.correlation_id(),
                    source = %envelope.source_app_id,
                    message_name = %envelope.message_name,
                    "Routing inbound message"
                );
                self.dispatcher.on_envelope_received(envelope);
            }
        }
    }
}
