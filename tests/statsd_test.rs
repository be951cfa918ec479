use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_datadog_sink::backend::Backend;
use tracing_datadog_sink::statsd::{StatsdBackend, StatsdConfig};
use tracing_datadog_sink::{DatadogHandler, GaugeMessage, HandlerConfig, LogRecord, Message, Severity};

fn agent() -> (UdpSocket, StatsdConfig) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind fake agent");
    socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let config = StatsdConfig {
        host: "127.0.0.1".to_string(),
        port: socket.local_addr().unwrap().port(),
        ..StatsdConfig::default()
    };
    (socket, config)
}

fn recv(socket: &UdpSocket) -> String {
    let mut buf = [0u8; 8192];
    let n = socket.recv(&mut buf).expect("datagram");
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

#[test]
fn gauge_sends_one_datagram_per_value() {
    let (agent, config) = agent();
    let backend = StatsdBackend::new(config).unwrap();

    let gauge = GaugeMessage {
        metric_name: "q.depth".to_string(),
        values: vec![1.0, 2.0, 3.0],
        tags: Some(vec!["env:test".to_string()]),
        sample_rate: 1.0,
    };
    backend.push_message(&Message::Gauge(gauge)).unwrap();

    let received: Vec<String> = (0..3).map(|_| recv(&agent)).collect();
    assert_eq!(
        received,
        vec!["q.depth:1|g|#env:test", "q.depth:2|g|#env:test", "q.depth:3|g|#env:test"]
    );
}

#[test]
fn handler_event_becomes_single_datagram() {
    let (agent, mut config) = agent();
    config.constant_tags = vec!["service:api".to_string()];
    let backend = Arc::new(StatsdBackend::new(config).unwrap());
    let handler = DatadogHandler::new(backend, HandlerConfig::default());

    handler.emit(
        LogRecord::new(Severity::ERROR, "billing", "charge failed")
            .with_attr("title", "Billing")
            .with_attr("tags", json!(["team:pay"])),
    );

    assert_eq!(
        recv(&agent),
        "_e{7,13}:Billing|charge failed|t:error|#team:pay,service:api"
    );
}

#[test]
fn namespace_prefixes_metric_names() {
    let (agent, mut config) = agent();
    config.namespace = Some("shop".to_string());
    let backend = Arc::new(StatsdBackend::new(config).unwrap());
    let handler = DatadogHandler::new(backend, HandlerConfig::default());

    handler.emit(LogRecord::new(Severity::INFO, "app", "orders").with_attr("datadog_todo", "gauge"));

    assert_eq!(recv(&agent), "shop.orders:0|g");
}
