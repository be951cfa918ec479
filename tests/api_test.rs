#![cfg(feature = "api")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tracing_datadog_sink::api::{ApiBackend, ApiConfig, ApiError};
use tracing_datadog_sink::backend::Backend;
use tracing_datadog_sink::{
    BackendError, DatadogFormatter, DatadogHandler, ErrorReporter, GaugeMessage, HandlerConfig, HandlerError, LogRecord, Message,
    Severity,
};

fn config(server: &ServerGuard) -> ApiConfig {
    let mut config = ApiConfig::new("test-api-key");
    config.base_url = server.url();
    config
}

#[derive(Default)]
struct CountingReporter(AtomicUsize);

impl ErrorReporter for CountingReporter {
    fn report(&self, _record: &LogRecord, _error: &HandlerError) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn gauge_values_travel_as_one_series() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/api/v1/series")
        .match_header("DD-API-KEY", "test-api-key")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::Regex(
            r#""metric":"q.depth","points":\[\[\d+,1\.0\],\[\d+,2\.0\],\[\d+,3\.0\]\],"type":"gauge""#.to_string(),
        ))
        .with_status(202)
        .expect(1)
        .create();

    let backend = ApiBackend::new(config(&server)).unwrap();
    let gauge = GaugeMessage {
        metric_name: "q.depth".to_string(),
        values: vec![1.0, 2.0, 3.0],
        tags: None,
        sample_rate: 1.0,
    };
    backend.push_message(&Message::Gauge(gauge)).unwrap();

    mock.assert();
}

#[test]
fn event_is_created_with_all_fields() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/api/v1/events")
        .match_header("DD-API-KEY", "test-api-key")
        .match_body(Matcher::Json(json!({
            "title": "Deploy",
            "text": "v2 rolled out\n\n@ops",
            "alert_type": "info",
            "aggregation_key": "deploys",
            "tags": ["env:prod"],
            "host": "web-1"
        })))
        .with_status(202)
        .expect(1)
        .create();

    let backend = Arc::new(ApiBackend::new(config(&server)).unwrap());
    let reporter = Arc::new(CountingReporter::default());
    let handler = DatadogHandler::new(backend, HandlerConfig::default()).with_reporter(reporter.clone());

    handler.emit(
        LogRecord::new(Severity::INFO, "deployer", "v2 rolled out")
            .with_attr("title", "Deploy")
            .with_attr("aggregation_key", "deploys")
            .with_attr("tags", json!(["env:prod"]))
            .with_attr("hostname", "web-1")
            .with_attr("mentions", json!(["@ops"])),
    );

    mock.assert();
    assert_eq!(reporter.0.load(Ordering::SeqCst), 0);
}

#[test]
fn api_rejection_surfaces_as_status_error() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/api/v1/events")
        .with_status(403)
        .with_body(r#"{"errors":["Forbidden"]}"#)
        .create();

    let backend = ApiBackend::new(config(&server)).unwrap();
    let mut record = LogRecord::new(Severity::ERROR, "app", "boom");
    let message = DatadogFormatter::default().format(&mut record).unwrap();

    match backend.push_message(&message) {
        Err(BackendError::Api(ApiError::Status { status, body })) => {
            assert_eq!(status, 403);
            assert!(body.contains("Forbidden"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[test]
fn handler_reports_api_failure_once() {
    let mut server = Server::new();
    let _mock = server.mock("POST", "/api/v1/series").with_status(500).create();

    let backend = Arc::new(ApiBackend::new(config(&server)).unwrap());
    let reporter = Arc::new(CountingReporter::default());
    let handler = DatadogHandler::new(backend, HandlerConfig::default()).with_reporter(reporter.clone());

    handler.emit(LogRecord::new(Severity::INFO, "app", "q.depth").with_attr("datadog_todo", "gauge"));

    assert_eq!(reporter.0.load(Ordering::SeqCst), 1);
    handler.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_call_works_inside_a_runtime() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/series")
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let backend = ApiBackend::new(config(&server)).unwrap();
    let gauge = GaugeMessage {
        metric_name: "m".to_string(),
        values: vec![1.0],
        tags: None,
        sample_rate: 1.0,
    };
    tokio::task::block_in_place(|| backend.push_message(&Message::Gauge(gauge))).unwrap();

    mock.assert_async().await;
}
