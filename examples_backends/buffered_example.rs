use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_datadog_sink::backend::{make_backend_from_config, parse_dsn};
use tracing_datadog_sink::init::init_tracing;
use tracing_datadog_sink::{DatadogHandler, HandlerConfig};

/// Buffers gauges in-process and flushes them every ten seconds.
///
/// The DSN can carry the API key (`datadog+buffered://<key>@api.datadoghq.com`);
/// without one the key is read from `DD_API_KEY`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dsn = std::env::var("DATADOG_DSN")
        .unwrap_or_else(|_| "datadog+buffered://api.datadoghq.com?namespace=worker".to_string());
    let backend = make_backend_from_config(&parse_dsn(&dsn)?)?;

    let handler = Arc::new(DatadogHandler::new(backend, HandlerConfig::default()));
    init_tracing(handler.clone())?;

    for depth in [3, 5, 8] {
        info!(datadog_todo = "gauge", args = ?[depth], "jobs.queued");
        std::thread::sleep(Duration::from_millis(200));
    }

    // Stops the flush task and ships whatever is still buffered.
    handler.close();
    Ok(())
}
