//! # End-to-End Integration Tests
//!
//! The full runtime with the simulated host services: discovery, then a
//! request to each service found.

#[cfg(test)]
mod tests {
    use payload_core::{CoreConfig, DispatchErrorKind};
    use payload_runtime::host_services::{LINK_SERVICE, POSITION_SERVICE, SENSOR_SERVICE};
    use payload_runtime::PayloadRuntime;
    use serde_json::json;
    use shared_types::StatusCode;
    use std::time::Duration;
    use tokio::time::timeout;

    const GUARD: Duration = Duration::from_secs(10);

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn fast_config() -> CoreConfig {
        let mut config = CoreConfig {
            app_id: "starter-app".into(),
            request_timeout: Duration::from_secs(2),
            ..CoreConfig::default()
        };
        config.heartbeat.pulse_interval = Duration::from_millis(20);
        config.heartbeat.received_tolerance = Duration::from_millis(200);
        config.tracker.sweep_interval = Duration::from_millis(20);
        config
    }

    async fn started_runtime() -> PayloadRuntime {
        let mut runtime = PayloadRuntime::new(fast_config());
        runtime.start().expect("runtime starts");
        runtime.start_host_services().expect("host services start");

        let found = timeout(
            GUARD,
            runtime
                .registry()
                .wait_for_service("hostsvc-", Duration::from_secs(2)),
        )
        .await
        .expect("guard");
        assert!(found.is_some(), "no host service came online");
        runtime
    }

    // =========================================================================
    // DEMO FLOW
    // =========================================================================

    #[tokio::test]
    async fn test_demo_completes_against_host_services() {
        let runtime = started_runtime().await;

        let report = timeout(GUARD, runtime.run_demo()).await.expect("guard");

        assert_eq!(report.discovered.len(), 4);
        assert!(report.all_successful(), "failed steps: {:?}", report.steps);
        assert_eq!(report.status_of("SensorsAvailableRequest"), Some(StatusCode::Successful));
        assert_eq!(report.status_of("TaskingPreCheckRequest"), Some(StatusCode::Successful));
        assert_eq!(report.status_of("TaskingRequest"), Some(StatusCode::Successful));

        let stats = runtime.dispatcher().tracker().stats().snapshot();
        assert_eq!(stats.registered, report.steps.len() as u64);
        assert_eq!(stats.completed, stats.registered);
        assert_eq!(stats.timed_out, 0);

        runtime.shutdown().await;
    }

    // =========================================================================
    // HOST SERVICE REPLIES
    // =========================================================================

    #[tokio::test]
    async fn test_position_reply_payload() {
        let runtime = started_runtime().await;

        let response = runtime
            .dispatcher()
            .send_request_default(POSITION_SERVICE, "PositionRequest", json!({}))
            .await
            .expect("response");

        assert_eq!(response.message_name, "PositionResponse");
        assert_eq!(response.header.message, "Success");
        assert_eq!(response.payload["point"]["x"], json!(6378137.0));

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_file_is_a_response_not_an_error() {
        let runtime = started_runtime().await;

        let response = runtime
            .dispatcher()
            .send_request_default(
                LINK_SERVICE,
                "LinkRequest",
                json!({ "file_name": "/nonexistent/file.txt" }),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::FileNotFound);
        assert_eq!(response.header.message, "File not found");

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_tasking_returns_sensor_data() {
        let runtime = started_runtime().await;

        let response = runtime
            .dispatcher()
            .send_request_default(SENSOR_SERVICE, "TaskingRequest", json!({ "sensor_id": "camera-1" }))
            .await
            .expect("response");

        assert!(response.header.is_success());
        assert_eq!(response.payload["sensor_data"]["data"], json!("test-sensor-data"));

        runtime.shutdown().await;
    }

    // =========================================================================
    // UNAVAILABLE SERVICES
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_service_is_unavailable() {
        let runtime = started_runtime().await;

        let err = runtime
            .dispatcher()
            .send_request("hostsvc-camera", "PositionRequest", json!({}), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DispatchErrorKind::Transport);
        assert_eq!(err.status(), StatusCode::Unavailable);
        assert_eq!(runtime.dispatcher().tracker().pending_count(), 0);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_fail_after_shutdown() {
        let runtime = started_runtime().await;
        let dispatcher = runtime.dispatcher().clone();
        runtime.shutdown().await;

        let err = dispatcher
            .send_request_default(POSITION_SERVICE, "PositionRequest", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DispatchErrorKind::Transport);
        assert_eq!(dispatcher.tracker().pending_count(), 0);
    }
}
