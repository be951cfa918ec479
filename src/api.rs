use crate::backend::{Backend, BackendError};
use crate::env::{env_or, DD_API_KEY_ENV, DD_APP_KEY_ENV, DD_SITE_ENV};
use crate::message::{EventMessage, GaugeMessage, Message};
use crate::worker::ApiWorker;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Default Datadog API endpoint (US1 site).
pub const DEFAULT_API_URL: &str = "https://api.datadoghq.com";

/// Configuration for the Datadog HTTP API.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub api_key: String,
    pub app_key: Option<String>,
    /// Base URL without path, e.g. "https://api.datadoghq.eu".
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Host reported on submitted series.
    pub hostname: Option<String>,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        ApiConfig {
            api_key: api_key.into(),
            app_key: None,
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            hostname: None,
        }
    }

    /// Build a config from `DD_API_KEY`, `DD_APP_KEY` and `DD_SITE`.
    ///
    /// Returns `None` when no API key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(DD_API_KEY_ENV).ok()?;
        let mut config = ApiConfig::new(api_key);
        config.app_key = std::env::var(DD_APP_KEY_ENV).ok();
        let site = env_or(DD_SITE_ENV, "");
        if !site.is_empty() {
            config.base_url = format!("https://api.{}", site);
        }
        Some(config)
    }
}

/// Error returned by the HTTP API client.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("datadog api responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to start api worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("api worker is not running")]
    WorkerGone,

    #[error("api call issued from the api worker thread")]
    WorkerReentrant,
}

/// One timeseries in a `/api/v1/series` payload.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Series {
    pub metric: String,
    /// `[timestamp, value]` pairs.
    pub points: Vec<(i64, f64)>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
}

impl Series {
    pub fn gauge(metric: impl Into<String>, points: Vec<(i64, f64)>, tags: Option<Vec<String>>) -> Self {
        Series {
            metric: metric.into(),
            points,
            kind: "gauge",
            tags,
            host: None,
            device: None,
            interval: None,
            sample_rate: None,
        }
    }
}

#[derive(Serialize)]
struct SeriesPayload<'a> {
    series: &'a [Series],
}

/// Async client for the Datadog events and series endpoints.
#[derive(Clone)]
pub struct DatadogApi {
    client: Client,
    config: ApiConfig,
}

impl DatadogApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `POST /api/v1/events`
    pub async fn create_event(&self, event: &EventMessage) -> Result<(), ApiError> {
        self.post("/api/v1/events", event).await
    }

    /// `POST /api/v1/series`
    pub async fn send_series(&self, series: &[Series]) -> Result<(), ApiError> {
        if series.is_empty() {
            return Ok(());
        }
        self.post("/api/v1/series", &SeriesPayload { series }).await
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, payload: &T) -> Result<(), ApiError> {
        let body = serde_json::to_vec(payload)?;
        let mut request = self
            .client
            .post(self.endpoint(path))
            .header("Content-Type", "application/json")
            .header("DD-API-KEY", &self.config.api_key);
        if let Some(app_key) = &self.config.app_key {
            request = request.header("DD-APPLICATION-KEY", app_key);
        }

        let resp = request.body(body).send().await?;
        if resp.status().is_success() {
            debug!(path, status = %resp.status(), "datadog api call succeeded");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(ApiError::Status { status, body })
        }
    }
}

/// Blocking Datadog HTTP API backend.
///
/// Each message becomes exactly one request; the log call waits for the
/// response and delivery errors are returned to the handler.
pub struct ApiBackend {
    api: DatadogApi,
    worker: ApiWorker,
}

impl ApiBackend {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let worker = ApiWorker::spawn("datadog-api")?;
        let api = {
            let _guard = worker.handle().enter();
            DatadogApi::new(config)?
        };
        Ok(Self { api, worker })
    }

    /// Create an event and wait for the response.
    pub fn create_event(&self, event: &EventMessage) -> Result<(), ApiError> {
        let api = self.api.clone();
        let event = event.clone();
        self.worker.block_on(async move { api.create_event(&event).await })?
    }

    /// Send all gauge values as points of a single series.
    pub fn send_metric(&self, gauge: &GaugeMessage) -> Result<(), ApiError> {
        let now = Utc::now().timestamp();
        let mut series = Series::gauge(
            gauge.metric_name.clone(),
            gauge.values.iter().map(|v| (now, *v)).collect(),
            gauge.tags.clone(),
        );
        series.host = self.api.config().hostname.clone();
        series.sample_rate = Some(gauge.sample_rate);

        let api = self.api.clone();
        self.worker.block_on(async move { api.send_series(&[series]).await })?
    }
}

impl Backend for ApiBackend {
    fn push_message(&self, message: &Message) -> Result<(), BackendError> {
        match message {
            Message::Event(event) => self.create_event(event)?,
            Message::Gauge(gauge) => self.send_metric(gauge)?,
        }
        Ok(())
    }

    fn close(&self) {
        self.worker.shutdown();
    }
}
