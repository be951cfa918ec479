use std::sync::Arc;

use tracing::{error, info};
use tracing_datadog_sink::{
    init::init_tracing, Backend, BackendError, DatadogHandler, HandlerConfig, Message,
};

/// Example of integrating a custom delivery strategy by implementing the
/// `Backend` trait directly. Imagine this forwards to an in-house metrics
/// relay instead of Datadog.
struct PrintBackend;

impl Backend for PrintBackend {
    fn push_message(&self, message: &Message) -> Result<(), BackendError> {
        match message {
            Message::Event(event) => println!("[relay] event {:?}: {}", event.title, event.text),
            Message::Gauge(gauge) => {
                for value in &gauge.values {
                    println!("[relay] gauge {}={}", gauge.metric_name, value);
                }
            }
        }
        Ok(())
    }
}

fn main() {
    let handler = Arc::new(DatadogHandler::new(Arc::new(PrintBackend), HandlerConfig::default()));

    init_tracing(handler).expect("install subscriber");

    info!("custom backend example started");
    info!(datadog_todo = "gauge", args = ?[1, 2], "relay.demo");
    error!(db = "relay", "simulated error sent via custom backend");
}
