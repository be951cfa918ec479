use crate::handler::DatadogHandler;
use crate::layer::DatadogLayer;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// Layer installation settings.
///
/// **Fields**
/// - `level`: least severe `tracing` level forwarded to the handler.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` with
///   the same level is stacked on top of [`DatadogLayer`] so events are
///   also printed.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber feeding `handler`.
///
/// **Effects**
///
/// This installs a [`Registry`] combined with [`DatadogLayer`] as the
/// global default subscriber, so all `tracing` events in the process are
/// observed by the layer. Fails if a global subscriber is already set.
pub fn init_tracing_with_config(handler: Arc<DatadogHandler>, config: LayerConfig) -> Result<(), SetGlobalDefaultError> {
    let layer = DatadogLayer::new(handler, config.level);

    // Two branches because the stacked subscriber types differ.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(LevelFilter::from_level(config.level));
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Initialize tracing with [`LayerConfig::default`].
pub fn init_tracing(handler: Arc<DatadogHandler>) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(handler, LayerConfig::default())
}
