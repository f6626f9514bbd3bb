//! # Discovery Integration Tests
//!
//! Heartbeats published on the bus, picked up by the inbound router and
//! queried through the registry.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use payload_core::testing::ManualTimeSource;
    use payload_core::{
        CorrelationTracker, HeartbeatEmitter, HeartbeatRegistry, InboundRouter, RequestDispatcher,
        TimeSource,
    };
    use shared_bus::{BusMessage, InMemoryMessageBus, MessageTransport};
    use shared_types::HeartbeatPulse;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::timeout;

    const GUARD: Duration = Duration::from_secs(5);

    /// Services seen on a typical host platform.
    const HOST_PLATFORM: [&str; 5] = [
        "hostsvc-position",
        "hostsvc-sensor",
        "hostsvc-link",
        "hostsvc-logging",
        "platformsvc-deployment",
    ];

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Bus plus a registry fed by a running inbound router.
    fn wired_registry() -> (
        Arc<InMemoryMessageBus>,
        Arc<HeartbeatRegistry>,
        watch::Sender<bool>,
    ) {
        let bus = Arc::new(InMemoryMessageBus::new());
        let registry = Arc::new(HeartbeatRegistry::new(Duration::from_secs(12)));
        let dispatcher = Arc::new(RequestDispatcher::new(
            "starter-app",
            bus.clone(),
            CorrelationTracker::default(),
            Duration::from_secs(2),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);

        InboundRouter::new(bus.clone(), dispatcher, registry.clone())
            .spawn(shutdown_rx)
            .expect("router subscribes");

        (bus, registry, shutdown)
    }

    async fn pulse_all(bus: &InMemoryMessageBus, services: &[&str]) {
        for service in services {
            bus.publish(BusMessage::Heartbeat(HeartbeatPulse::now(*service)))
                .await
                .unwrap();
        }
    }

    // =========================================================================
    // PATTERN FILTERING
    // =========================================================================

    #[tokio::test]
    async fn test_filter_by_pattern_over_bus_heartbeats() {
        let (bus, registry, _shutdown) = wired_registry();
        pulse_all(&bus, &HOST_PLATFORM).await;

        // Pulses are routed in order; the last one arriving means all did
        let last = timeout(
            GUARD,
            registry.wait_for_service("platformsvc-", GUARD),
        )
        .await
        .expect("guard");
        assert_eq!(last.as_deref(), Some("platformsvc-deployment"));

        assert_eq!(registry.filter_by_pattern("sensor"), vec!["hostsvc-sensor"]);
        assert_eq!(
            registry.filter_by_pattern("hostsvc-"),
            vec![
                "hostsvc-link",
                "hostsvc-logging",
                "hostsvc-position",
                "hostsvc-sensor"
            ]
        );
        assert_eq!(registry.list_online_default().len(), 5);
        assert!(registry.filter_by_pattern("camera").is_empty());
    }

    #[tokio::test]
    async fn test_filter_by_pattern_host_services_only() {
        let (bus, registry, _shutdown) = wired_registry();
        pulse_all(&bus, &HOST_PLATFORM[..4]).await;

        let found = timeout(GUARD, registry.wait_for_service("logging", GUARD))
            .await
            .expect("guard");
        assert_eq!(found.as_deref(), Some("hostsvc-logging"));
        assert_eq!(registry.filter_by_pattern("sensor"), vec!["hostsvc-sensor"]);
    }

    // =========================================================================
    // STALENESS
    // =========================================================================

    #[test]
    fn test_liveness_follows_each_service_own_pulses() {
        let clock = ManualTimeSource::new();
        let window = Duration::from_secs(12);
        let registry = HeartbeatRegistry::with_time_source(window, Arc::new(clock.clone()));

        registry.record(HeartbeatPulse::new("hostsvc-position", clock.now()));
        clock.advance(Duration::from_secs(8));
        registry.record(HeartbeatPulse::new("hostsvc-sensor", clock.now()));

        assert!(registry.is_online("hostsvc-position", window));
        assert!(registry.is_online("hostsvc-sensor", window));

        // Position is now 13s old, sensor 5s
        clock.advance(Duration::from_secs(5));
        assert!(!registry.is_online("hostsvc-position", window));
        assert!(registry.is_online("hostsvc-sensor", window));
        assert_eq!(registry.list_online(window), vec!["hostsvc-sensor"]);

        // A fresh pulse brings it back
        registry.record(HeartbeatPulse::new("hostsvc-position", clock.now()));
        assert_eq!(
            registry.list_online(window),
            vec!["hostsvc-position", "hostsvc-sensor"]
        );
    }

    #[test]
    fn test_never_seen_service_is_offline() {
        let registry = HeartbeatRegistry::new(Duration::from_secs(12));
        registry.record(HeartbeatPulse::new("hostsvc-link", Utc::now()));

        assert!(!registry.is_online("hostsvc-sensor", Duration::from_secs(12)));
        assert!(registry.last_seen("hostsvc-sensor").is_none());
    }

    // =========================================================================
    // EMITTERS
    // =========================================================================

    #[tokio::test]
    async fn test_emitter_makes_service_discoverable() {
        let (bus, registry, shutdown) = wired_registry();

        let emitter = HeartbeatEmitter::new(
            "hostsvc-position",
            bus.clone(),
            Duration::from_millis(20),
        )
        .spawn(shutdown.subscribe());

        let found = timeout(GUARD, registry.wait_for_service("position", GUARD))
            .await
            .expect("guard");
        assert_eq!(found.as_deref(), Some("hostsvc-position"));
        assert!(registry.is_online("hostsvc-position", Duration::from_secs(1)));

        shutdown.send(true).unwrap();
        timeout(GUARD, emitter).await.expect("guard").unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_absent_service_times_out() {
        let (bus, registry, _shutdown) = wired_registry();
        pulse_all(&bus, &["hostsvc-link"]).await;

        let found = registry
            .wait_for_service("hostsvc-sensor", Duration::from_millis(50))
            .await;
        assert!(found.is_none());
    }
}
