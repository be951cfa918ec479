use std::sync::Arc;

use tracing::{info, warn};
use tracing_datadog_sink::api::{ApiBackend, ApiConfig};
use tracing_datadog_sink::init::init_tracing;
use tracing_datadog_sink::{DatadogHandler, HandlerConfig, Severity};

/// Posts every record straight to the Datadog HTTP API.
///
/// Requires `DD_API_KEY` (and optionally `DD_SITE`).
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let api = ApiConfig::from_env().ok_or("DD_API_KEY is not set")?;
    let backend = Arc::new(ApiBackend::new(api)?);

    let handler = Arc::new(DatadogHandler::new(
        backend,
        HandlerConfig {
            level: Some(Severity::INFO),
            ..HandlerConfig::default()
        },
    ));
    init_tracing(handler.clone())?;

    warn!(title = "Cache degraded", tags = ?["cache:redis"], "hit ratio at {}%", 41);
    info!(datadog_todo = "gauge", args = ?[0.41], "cache.hit_ratio");

    handler.close();
    Ok(())
}
