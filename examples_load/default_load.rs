use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_datadog_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_datadog_sink::noop_sink::NoopBackend;
use tracing_datadog_sink::{DatadogHandler, HandlerConfig};

fn main() {
    let handler = Arc::new(DatadogHandler::new(Arc::new(NoopBackend), HandlerConfig::default()));
    let stats = handler.stats();

    let layer_config = LayerConfig {
        enable_stdout: false,
        ..LayerConfig::default()
    };
    init_tracing_with_config(handler, layer_config).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, tags = ?["load:default"], "load test error {}", i);
    }

    let elapsed = start.elapsed();
    println!("classified {} events in {:?} (~{:.0} ev/s), {} failed",
        stats.emitted.load(Ordering::Relaxed),
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        stats.failed.load(Ordering::Relaxed),
    );
}
