use crate::backend::{should_sample, Backend, BackendError};
use crate::env::{env_or, DD_AGENT_HOST_ENV, DD_DOGSTATSD_PORT_ENV};
use crate::message::{EventMessage, Message};
use std::fmt::Write as _;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::trace;

/// Largest datagram the agent accepts by default.
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024;

/// Configuration for [`StatsdBackend`].
#[derive(Clone, Debug)]
pub struct StatsdConfig {
    /// Agent host, e.g. "127.0.0.1".
    pub host: String,
    pub port: u16,
    /// Prefix prepended to every metric name as `namespace.name`.
    pub namespace: Option<String>,
    /// Tags appended to every gauge and event.
    pub constant_tags: Vec<String>,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8125,
            namespace: None,
            constant_tags: Vec::new(),
        }
    }
}

impl StatsdConfig {
    /// Read host and port from `DD_AGENT_HOST` / `DD_DOGSTATSD_PORT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let port = env_or(DD_DOGSTATSD_PORT_ENV, "")
            .parse()
            .unwrap_or(defaults.port);
        Self {
            host: env_or(DD_AGENT_HOST_ENV, &defaults.host),
            port,
            ..defaults
        }
    }
}

/// Stateless DogStatsD client over UDP.
///
/// Every event is a single datagram and every gauge value its own datagram.
/// Sends are fire-and-forget: only local socket errors are reported.
pub struct StatsdBackend {
    socket: UdpSocket,
    target: SocketAddr,
    namespace: Option<String>,
    constant_tags: Vec<String>,
}

impl StatsdBackend {
    pub fn new(config: StatsdConfig) -> Result<Self, BackendError> {
        let target = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("cannot resolve {}", config.host)))?;
        let bind_addr: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;

        Ok(StatsdBackend {
            socket,
            target,
            namespace: config.namespace,
            constant_tags: config.constant_tags,
        })
    }

    /// Send one event datagram.
    pub fn event(&self, event: &EventMessage) -> Result<(), BackendError> {
        let payload = format_event(event, &self.constant_tags)?;
        self.send(&payload)
    }

    /// Send one gauge datagram, subject to sampling.
    pub fn gauge(&self, name: &str, value: f64, tags: Option<&[String]>, sample_rate: f64) -> Result<(), BackendError> {
        if !should_sample(sample_rate) {
            return Ok(());
        }
        let payload = format_gauge(self.namespace.as_deref(), name, value, tags, &self.constant_tags, sample_rate);
        self.send(&payload)
    }

    fn send(&self, payload: &str) -> Result<(), BackendError> {
        trace!(payload, "dogstatsd send");
        self.socket.send_to(payload.as_bytes(), self.target)?;
        Ok(())
    }
}

impl Backend for StatsdBackend {
    fn push_message(&self, message: &Message) -> Result<(), BackendError> {
        match message {
            Message::Event(event) => self.event(event),
            Message::Gauge(gauge) => {
                for value in &gauge.values {
                    self.gauge(&gauge.metric_name, *value, gauge.tags.as_deref(), gauge.sample_rate)?;
                }
                Ok(())
            }
        }
    }
}

fn push_tags(out: &mut String, tags: Option<&[String]>, constant_tags: &[String]) {
    let mut all = tags.unwrap_or_default().iter().chain(constant_tags.iter()).peekable();
    if all.peek().is_none() {
        return;
    }
    out.push_str("|#");
    for (i, tag) in all.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(tag);
    }
}

/// Render a gauge as `[namespace.]name:value|g[|@rate][|#tags]`.
pub fn format_gauge(
    namespace: Option<&str>,
    name: &str,
    value: f64,
    tags: Option<&[String]>,
    constant_tags: &[String],
    sample_rate: f64,
) -> String {
    let mut out = String::new();
    if let Some(ns) = namespace {
        out.push_str(ns);
        out.push('.');
    }
    let _ = write!(out, "{}:{}|g", name, value);
    if sample_rate != 1.0 {
        let _ = write!(out, "|@{}", sample_rate);
    }
    push_tags(&mut out, tags, constant_tags);
    out
}

/// Render an event datagram.
///
/// Fails with [`BackendError::PayloadTooLarge`] when the datagram would not
/// fit into [`MAX_PAYLOAD_SIZE`].
pub fn format_event(event: &EventMessage, constant_tags: &[String]) -> Result<String, BackendError> {
    let title = event.title.replace('\n', "\\n");
    let text = event.text.replace('\n', "\\n");

    let mut out = format!("_e{{{},{}}}:{}|{}", title.len(), text.len(), title, text);
    if let Some(date) = event.date_happened {
        let _ = write!(out, "|d:{}", date.timestamp());
    }
    if let Some(host) = &event.hostname {
        let _ = write!(out, "|h:{}", host);
    }
    if let Some(key) = &event.aggregation_key {
        let _ = write!(out, "|k:{}", key);
    }
    if let Some(priority) = event.priority {
        let _ = write!(out, "|p:{}", priority.as_str());
    }
    if let Some(source) = &event.source_type_name {
        let _ = write!(out, "|s:{}", source);
    }
    if let Some(alert) = event.alert_type {
        let _ = write!(out, "|t:{}", alert);
    }
    push_tags(&mut out, event.tags.as_deref(), constant_tags);

    if out.len() > MAX_PAYLOAD_SIZE {
        return Err(BackendError::PayloadTooLarge(out.len()));
    }
    Ok(out)
}
