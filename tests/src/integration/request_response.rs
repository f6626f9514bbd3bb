//! # Request/Response Integration Tests
//!
//! Drives the dispatcher, tracker and inbound router together over the
//! in-memory bus, with scripted responders standing in for other apps.

#[cfg(test)]
mod tests {
    use payload_core::testing::{spawn_echo_responder, FailingTransport};
    use payload_core::{
        CorrelationTracker, DispatchError, DispatchErrorKind, HeartbeatRegistry, InboundRouter,
        RequestDispatcher, ResolveOutcome, Settlement,
    };
    use serde_json::json;
    use shared_bus::{BusMessage, InMemoryMessageBus, MessageTransport, Topic, TopicFilter};
    use shared_types::{CorrelationId, DirectMessage, StatusCode, TransportError};
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};
    use tokio::time::{timeout, Instant};

    const APP_ID: &str = "starter-app";
    const GUARD: Duration = Duration::from_secs(5);

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    struct Harness {
        bus: Arc<InMemoryMessageBus>,
        dispatcher: Arc<RequestDispatcher>,
        _shutdown: watch::Sender<bool>,
    }

    /// Bus, dispatcher and a running inbound router for `APP_ID`.
    fn harness() -> Harness {
        let bus = Arc::new(InMemoryMessageBus::new());
        let dispatcher = Arc::new(RequestDispatcher::new(
            APP_ID,
            bus.clone(),
            CorrelationTracker::default(),
            Duration::from_secs(2),
        ));
        let registry = Arc::new(HeartbeatRegistry::new(Duration::from_secs(12)));
        let (shutdown, shutdown_rx) = watch::channel(false);

        InboundRouter::new(bus.clone(), dispatcher.clone(), registry)
            .spawn(shutdown_rx)
            .expect("router subscribes");

        Harness {
            bus,
            dispatcher,
            _shutdown: shutdown,
        }
    }

    /// Collects one request for each of `services`, then answers them in
    /// `reply_order`. Each reply's payload names the service that sent it.
    fn spawn_reordering_responder(
        bus: Arc<InMemoryMessageBus>,
        services: &[&str],
        reply_order: &'static [&'static str],
    ) -> tokio::task::JoinHandle<()> {
        let topics = services
            .iter()
            .map(|s| Topic::DirectToApp(s.to_string()))
            .collect();
        let mut requests = bus.subscribe(TopicFilter::topics(topics)).unwrap();
        let expected = services.len();

        tokio::spawn(async move {
            let mut held: HashMap<String, DirectMessage> = HashMap::new();
            while held.len() < expected {
                let Some(BusMessage::Direct(request)) = requests.recv().await else {
                    return;
                };
                held.insert(request.destination_app_id.clone(), request);
            }

            for service in reply_order {
                let request = &held[*service];
                let reply = DirectMessage::reply(
                    request,
                    "EchoResponse",
                    StatusCode::Successful,
                    "Success",
                    json!({ "from": service, "echo": request.payload.clone() }),
                );
                bus.publish(BusMessage::Direct(reply)).await.unwrap();
            }
        })
    }

    // =========================================================================
    // ROUND TRIP
    // =========================================================================

    #[tokio::test]
    async fn test_caller_receives_exact_response_sent() {
        let h = harness();
        let mut requests = h.bus.subscribe(TopicFilter::direct("hostsvc-position")).unwrap();
        let (sent_tx, mut sent_rx) = mpsc::channel(1);

        let bus = h.bus.clone();
        tokio::spawn(async move {
            if let Some(BusMessage::Direct(request)) = requests.recv().await {
                let reply = DirectMessage::reply(
                    &request,
                    "PositionResponse",
                    StatusCode::Successful,
                    "Success",
                    json!({ "point": { "x": 6378137.0, "y": 0.0, "z": 0.0 } }),
                );
                sent_tx.send(reply.clone()).await.unwrap();
                bus.publish(BusMessage::Direct(reply)).await.unwrap();
            }
        });

        let received = timeout(
            GUARD,
            h.dispatcher
                .send_request("hostsvc-position", "PositionRequest", json!({}), GUARD),
        )
        .await
        .expect("guard")
        .expect("response");

        let sent = sent_rx.recv().await.unwrap();
        assert_eq!(received, sent);
        assert_eq!(h.dispatcher.tracker().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_echo_many_concurrent_requests() {
        let h = harness();
        spawn_echo_responder(h.bus.clone(), "hostsvc-logging").unwrap();

        let calls = (0..100).map(|i| {
            let dispatcher = h.dispatcher.clone();
            async move {
                let response = dispatcher
                    .send_request("hostsvc-logging", "LogRequest", json!({ "seq": i }), GUARD)
                    .await
                    .expect("response");
                (i, response)
            }
        });

        let results = timeout(GUARD, futures::future::join_all(calls))
            .await
            .expect("guard");

        for (i, response) in results {
            assert_eq!(response.payload, json!({ "seq": i }));
            assert_eq!(response.message_name, "LogResponse");
        }
        let stats = h.dispatcher.tracker().stats().snapshot();
        assert_eq!(stats.registered, 100);
        assert_eq!(stats.completed, 100);
        assert_eq!(stats.dropped, 0);
    }

    // =========================================================================
    // OUT-OF-ORDER RESPONSES
    // =========================================================================

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let h = harness();
        let responder = spawn_reordering_responder(
            h.bus.clone(),
            &["svc-a", "svc-b", "svc-c"],
            &["svc-c", "svc-a", "svc-b"],
        );

        let call = |dest: &'static str| {
            let dispatcher = h.dispatcher.clone();
            async move {
                dispatcher
                    .send_request(dest, "EchoRequest", json!({ "to": dest }), GUARD)
                    .await
            }
        };

        let (a, b, c) = timeout(GUARD, async {
            tokio::join!(call("svc-a"), call("svc-b"), call("svc-c"))
        })
        .await
        .expect("guard");

        for (dest, response) in [("svc-a", a), ("svc-b", b), ("svc-c", c)] {
            let response = response.expect("response");
            assert_eq!(response.source_app_id, dest);
            assert_eq!(response.payload["from"], json!(dest));
            assert_eq!(response.payload["echo"], json!({ "to": dest }));
        }

        responder.await.unwrap();
        assert_eq!(h.dispatcher.tracker().pending_count(), 0);
    }

    // =========================================================================
    // TIMEOUTS
    // =========================================================================

    #[tokio::test]
    async fn test_silent_destination_reports_unavailable() {
        let h = harness();
        // Keeps the route alive without ever answering
        let _silent = h.bus.subscribe(TopicFilter::direct("hostsvc-sensor")).unwrap();

        let started = Instant::now();
        let result = timeout(
            GUARD,
            h.dispatcher.send_request(
                "hostsvc-sensor",
                "SensorsAvailableRequest",
                json!({}),
                Duration::from_millis(50),
            ),
        )
        .await
        .expect("guard");
        let elapsed = started.elapsed();

        let err = result.unwrap_err();
        assert_eq!(err.kind(), DispatchErrorKind::Unavailable);
        assert_eq!(err.status(), StatusCode::Unavailable);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(1));

        let DispatchError::Unavailable { correlation_id, .. } = err else {
            unreachable!();
        };
        assert!(!h.dispatcher.tracker().is_pending(&correlation_id));
        assert_eq!(
            h.dispatcher.tracker().settlement_of(&correlation_id),
            Some(Settlement::TimedOut)
        );
    }

    #[tokio::test]
    async fn test_late_response_does_not_overwrite_timeout() {
        let h = harness();
        let mut requests = h.bus.subscribe(TopicFilter::direct("hostsvc-link")).unwrap();

        let result = h
            .dispatcher
            .send_request(
                "hostsvc-link",
                "LinkRequest",
                json!({ "file_name": "/test/file.txt" }),
                Duration::from_millis(30),
            )
            .await;
        assert!(matches!(result, Err(DispatchError::Unavailable { .. })));

        let Some(BusMessage::Direct(request)) = requests.recv().await else {
            panic!("request not published");
        };
        let late = DirectMessage::reply(
            &request,
            "LinkResponse",
            StatusCode::Successful,
            "Success",
            json!({}),
        );

        assert_eq!(
            h.dispatcher.on_envelope_received(late),
            ResolveOutcome::DuplicateResolution(Settlement::TimedOut)
        );
        assert_eq!(
            h.dispatcher.tracker().settlement_of(&request.correlation_id()),
            Some(Settlement::TimedOut)
        );

        let stats = h.dispatcher.tracker().stats().snapshot();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.dropped, 1);
    }

    // =========================================================================
    // UNKNOWN CORRELATION
    // =========================================================================

    #[tokio::test]
    async fn test_stray_response_leaves_pending_request_intact() {
        let h = harness();
        let mut requests = h.bus.subscribe(TopicFilter::direct("hostsvc-link")).unwrap();

        let dispatcher = h.dispatcher.clone();
        let caller = tokio::spawn(async move {
            dispatcher
                .send_request(
                    "hostsvc-link",
                    "LinkRequest",
                    json!({ "file_name": "/test/file.txt" }),
                    GUARD,
                )
                .await
        });

        let Some(BusMessage::Direct(request)) =
            timeout(GUARD, requests.recv()).await.expect("guard")
        else {
            panic!("request not published");
        };

        // A response nobody asked for
        let stray = DirectMessage::request(
            "hostsvc-link",
            APP_ID,
            "LinkResponse",
            shared_types::TrackingId::new(),
            CorrelationId::new(),
            json!({}),
        );
        h.bus.publish(BusMessage::Direct(stray)).await.unwrap();

        let reply = DirectMessage::reply(
            &request,
            "LinkResponse",
            StatusCode::Successful,
            "Success",
            json!({ "file_name": "/test/file.txt" }),
        );
        h.bus.publish(BusMessage::Direct(reply.clone())).await.unwrap();

        let response = timeout(GUARD, caller)
            .await
            .expect("guard")
            .unwrap()
            .expect("response");
        assert_eq!(response, reply);

        // The router handles messages in order, so the stray was seen first
        let stats = h.dispatcher.tracker().stats().snapshot();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.completed, 1);
    }

    // =========================================================================
    // TRANSPORT FAILURES
    // =========================================================================

    #[tokio::test]
    async fn test_publish_failure_returns_without_waiting() {
        let transport = Arc::new(FailingTransport::new(TransportError::Rejected(
            "bus unavailable".into(),
        )));
        let dispatcher = RequestDispatcher::new(
            APP_ID,
            transport,
            CorrelationTracker::default(),
            Duration::from_secs(30),
        );

        let started = Instant::now();
        let err = dispatcher
            .send_request_default("hostsvc-position", "PositionRequest", json!({}))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(err.kind(), DispatchErrorKind::Transport);
        assert_eq!(err.status(), StatusCode::GeneralFailure);
        assert_eq!(dispatcher.tracker().pending_count(), 0);
        assert_eq!(dispatcher.tracker().stats().snapshot().cancelled, 1);
    }

    #[tokio::test]
    async fn test_missing_destination_is_undeliverable() {
        let h = harness();

        let err = h
            .dispatcher
            .send_request("hostsvc-camera", "PositionRequest", json!({}), GUARD)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Transport(TransportError::Undeliverable { .. })
        ));
        assert_eq!(err.status(), StatusCode::Unavailable);
        assert_eq!(h.dispatcher.tracker().pending_count(), 0);
    }

    // =========================================================================
    // CORRELATION IDS
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_get_distinct_ids() {
        let tracker = CorrelationTracker::default();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    (0..500)
                        .map(|_| tracker.register(GUARD))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        let mut handles = Vec::new();
        for task in tasks {
            for (id, handle) in task.await.unwrap() {
                assert!(ids.insert(id), "duplicate correlation id {id}");
                handles.push(handle);
            }
        }

        assert_eq!(ids.len(), 4000);
        assert_eq!(tracker.pending_count(), 4000);

        drop(handles);
        assert_eq!(tracker.pending_count(), 0);
    }
}
