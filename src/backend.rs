use std::sync::Arc;

use url::{Host, Url};

use crate::message::Message;
use crate::statsd::{StatsdBackend, StatsdConfig};

/// Destination for [`Message`]s produced by the handler.
///
/// Implementations know how to turn each message variant into one or more
/// calls against a concrete Datadog transport. `push_message` runs on the
/// thread that emitted the log record.
pub trait Backend: Send + Sync {
    /// Deliver a single message.
    ///
    /// **Returns**
    /// - `Ok(())` if the message was sent or accepted into a buffer.
    /// - `Err(..)` if delivery failed. The handler reports the error and
    ///   moves on; there are no retries.
    fn push_message(&self, message: &Message) -> Result<(), BackendError>;

    /// Release resources held by the backend (background flushers, worker
    /// threads). Default implementation is a no-op.
    fn close(&self) {}
}

/// Error returned by a [`Backend`] while delivering a message.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("statsd socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload of {0} bytes exceeds the 8 KiB datagram limit")]
    PayloadTooLarge(usize),

    #[cfg(feature = "api")]
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
}

/// Whether a value submitted with `sample_rate` should be kept.
pub(crate) fn should_sample(sample_rate: f64) -> bool {
    sample_rate >= 1.0 || rand::random::<f64>() <= sample_rate
}

/// Supported backend kinds that can be selected via DSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Statsd,
    Api,
    Buffered,
}

/// Backend configuration built from a DSN.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Selected backend implementation.
    pub kind: BackendKind,
    /// Raw DSN that was used to construct this config.
    pub dsn: String,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, dsn: impl Into<String>) -> Self {
        BackendConfig { kind, dsn: dsn.into() }
    }
}

/// Parse a DSN string and infer the backend kind from its scheme.
///
/// Examples:
/// - "statsd://127.0.0.1:8125?namespace=shop"
/// - "datadog://<api_key>@api.datadoghq.eu"
/// - "datadog+buffered://api.datadoghq.com" (key taken from `DD_API_KEY`)
pub fn parse_dsn(dsn: &str) -> Result<BackendConfig, DsnError> {
    let lower = dsn.to_ascii_lowercase();

    if lower.starts_with("statsd://") || lower.starts_with("dogstatsd://") {
        Ok(BackendConfig::new(BackendKind::Statsd, dsn))
    } else if lower.starts_with("datadog+buffered://") {
        Ok(BackendConfig::new(BackendKind::Buffered, dsn))
    } else if lower.starts_with("datadog://") {
        Ok(BackendConfig::new(BackendKind::Api, dsn))
    } else {
        Err(DsnError::UnknownScheme)
    }
}

/// Error type returned when parsing a DSN.
#[derive(thiserror::Error, Debug)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,
}

/// Error type returned when building a backend from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BackendBuildError {
    #[error("api feature is not enabled")]
    ApiFeatureDisabled,

    #[error("no API key in DSN and {} is not set", crate::env::DD_API_KEY_ENV)]
    MissingApiKey,

    #[error("invalid DSN: {0}")]
    InvalidDsn(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Pieces of a `scheme://[userinfo@]host[:port][?query]` DSN.
#[derive(Debug, Default, PartialEq)]
struct DsnParts {
    userinfo: Option<String>,
    /// Bare host; IPv6 literals carry no brackets.
    host: String,
    /// Host as written in a URL authority.
    url_host: String,
    port: Option<u16>,
    query: Vec<(String, String)>,
}

impl DsnParts {
    fn parse(dsn: &str) -> Result<Self, BackendBuildError> {
        let url = Url::parse(dsn).map_err(|e| BackendBuildError::InvalidDsn(format!("{}: {}", dsn, e)))?;

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => String::new(),
        };
        let userinfo = urlencoding::decode(url.username())
            .map(|u| u.into_owned())
            .map_err(|e| BackendBuildError::InvalidDsn(e.to_string()))?;

        Ok(DsnParts {
            userinfo: Some(userinfo).filter(|u| !u.is_empty()),
            host,
            url_host: url.host_str().unwrap_or_default().to_string(),
            port: url.port(),
            query: url.query_pairs().into_owned().collect(),
        })
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Create a concrete [`Backend`] from a [`BackendConfig`].
///
/// This is the main entry point for applications that want to select a
/// backend using a single DSN string instead of constructing it manually.
pub fn make_backend_from_config(cfg: &BackendConfig) -> Result<Arc<dyn Backend>, BackendBuildError> {
    let parts = DsnParts::parse(&cfg.dsn)?;

    match cfg.kind {
        BackendKind::Statsd => {
            let defaults = StatsdConfig::default();
            let config = StatsdConfig {
                host: if parts.host.is_empty() { defaults.host } else { parts.host.clone() },
                port: parts.port.unwrap_or(defaults.port),
                namespace: parts.param("namespace").map(str::to_string),
                constant_tags: parts
                    .param("tags")
                    .map(|t| t.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
            };
            let backend = StatsdBackend::new(config)?;
            Ok(Arc::new(backend) as Arc<dyn Backend>)
        }
        BackendKind::Api | BackendKind::Buffered => {
            #[cfg(feature = "api")]
            {
                use crate::api::{ApiBackend, ApiConfig};
                use crate::buffered::{BufferedBackend, BufferedClientConfig, StartOptions};

                let api_key = match parts.userinfo.clone() {
                    Some(key) => key,
                    None => std::env::var(crate::env::DD_API_KEY_ENV).map_err(|_| BackendBuildError::MissingApiKey)?,
                };
                let mut api = ApiConfig::new(api_key);
                if !parts.url_host.is_empty() {
                    api.base_url = match parts.port {
                        Some(port) => format!("https://{}:{}", parts.url_host, port),
                        None => format!("https://{}", parts.url_host),
                    };
                }

                if cfg.kind == BackendKind::Api {
                    let backend = ApiBackend::new(api).map_err(BackendError::from)?;
                    Ok(Arc::new(backend) as Arc<dyn Backend>)
                } else {
                    let client = BufferedClientConfig {
                        namespace: parts.param("namespace").map(str::to_string),
                        constant_tags: parts
                            .param("tags")
                            .map(|t| t.split(',').map(str::to_string).collect())
                            .unwrap_or_default(),
                    };
                    let backend = BufferedBackend::new(api, client, StartOptions::default()).map_err(BackendError::from)?;
                    Ok(Arc::new(backend) as Arc<dyn Backend>)
                }
            }

            #[cfg(not(feature = "api"))]
            {
                let _ = parts;
                Err(BackendBuildError::ApiFeatureDisabled)
            }
        }
    }
}
