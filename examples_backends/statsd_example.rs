use std::sync::Arc;

use tracing::{error, info};
use tracing_datadog_sink::init::init_tracing;
use tracing_datadog_sink::statsd::{StatsdBackend, StatsdConfig};
use tracing_datadog_sink::{DatadogHandler, FormatterConfig, HandlerConfig};

/// Sends events and gauges to a local Datadog agent over DogStatsD.
///
/// Host and port come from `DD_AGENT_HOST` / `DD_DOGSTATSD_PORT`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let backend = StatsdBackend::new(StatsdConfig {
        namespace: Some("shop".to_string()),
        ..StatsdConfig::from_env()
    })?;

    let config = HandlerConfig {
        formatter: FormatterConfig {
            tags: Some(vec!["service:checkout".to_string()]),
            mentions: Some(vec!["@oncall".to_string()]),
            ..FormatterConfig::default()
        },
        level: None,
    };
    let handler = Arc::new(DatadogHandler::new(Arc::new(backend), config));
    init_tracing(handler)?;

    info!(datadog_todo = "gauge", args = ?[12, 14], "queue.depth");
    error!(title = "Checkout failed", aggregation_key = "checkout", "order {} rejected", 1234);
    Ok(())
}
