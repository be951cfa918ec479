use crate::api::{ApiConfig, ApiError, DatadogApi, Series};
use crate::backend::{should_sample, Backend, BackendError};
use crate::message::{EventMessage, Message};
use crate::worker::ApiWorker;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Construction options of [`BufferedClient`].
#[derive(Clone, Debug, Default)]
pub struct BufferedClientConfig {
    /// Prefix prepended to every metric name as `namespace.name`.
    pub namespace: Option<String>,
    /// Tags added to every gauge and event.
    pub constant_tags: Vec<String>,
}

/// Options passed to [`BufferedClient::start`].
#[derive(Clone, Debug)]
pub struct StartOptions {
    /// How often buffered data is shipped.
    pub flush_interval: Duration,
    /// Width of the buckets gauges are rolled up into.
    pub roll_up_interval: Duration,
    /// Device reported on every series.
    pub device: Option<String>,
    /// Flush from a background task; otherwise enqueue calls flush inline
    /// once `flush_interval` has elapsed.
    pub flush_in_thread: bool,
    /// Drop everything instead of buffering.
    pub disabled: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
            roll_up_interval: Duration::from_secs(10),
            device: None,
            flush_in_thread: true,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GaugeKey {
    name: String,
    tags: Vec<String>,
    bucket: i64,
}

#[derive(Default)]
struct Buffer {
    /// `None` until started and after stop.
    options: Option<StartOptions>,
    events: Vec<EventMessage>,
    gauges: BTreeMap<GaugeKey, f64>,
    last_flush: Option<Instant>,
}

impl Buffer {
    fn drain(&mut self, namespace: Option<&str>, constant_tags: &[String]) -> (Vec<EventMessage>, Vec<Series>) {
        let device = self.options.as_ref().and_then(|o| o.device.clone());
        let interval = self.options.as_ref().map(|o| o.roll_up_interval.as_secs().max(1));

        let events = std::mem::take(&mut self.events)
            .into_iter()
            .map(|mut event| {
                if !constant_tags.is_empty() {
                    event.tags.get_or_insert_with(Vec::new).extend(constant_tags.iter().cloned());
                }
                event
            })
            .collect();

        let series = std::mem::take(&mut self.gauges)
            .into_iter()
            .map(|(key, value)| {
                let metric = match namespace {
                    Some(ns) => format!("{}.{}", ns, key.name),
                    None => key.name,
                };
                let mut tags = key.tags;
                tags.extend(constant_tags.iter().cloned());
                let mut series = Series::gauge(metric, vec![(key.bucket, value)], Some(tags).filter(|t| !t.is_empty()));
                series.device = device.clone();
                series.interval = interval;
                series
            })
            .collect();

        self.last_flush = Some(Instant::now());
        (events, series)
    }
}

struct FlushLoop {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Client that buffers events and gauges locally and ships them to the
/// HTTP API periodically.
///
/// Gauges are rolled up per `(name, tags, bucket)` keeping the last value.
/// Flush failures are logged and the batch is dropped; callers never see
/// them. Enqueueing is safe from any number of threads.
pub struct BufferedClient {
    api: DatadogApi,
    worker: ApiWorker,
    namespace: Option<String>,
    constant_tags: Vec<String>,
    buffer: Arc<Mutex<Buffer>>,
    flush_loop: Mutex<Option<FlushLoop>>,
}

impl BufferedClient {
    pub fn new(api: ApiConfig, config: BufferedClientConfig) -> Result<Self, ApiError> {
        let worker = ApiWorker::spawn("datadog-buffered")?;
        let api = {
            let _guard = worker.handle().enter();
            DatadogApi::new(api)?
        };
        Ok(BufferedClient {
            api,
            worker,
            namespace: config.namespace,
            constant_tags: config.constant_tags,
            buffer: Arc::new(Mutex::new(Buffer::default())),
            flush_loop: Mutex::new(None),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        lock_buffer(&self.buffer)
    }

    /// Start buffering. Restarting a running client replaces its options.
    pub fn start(&self, options: StartOptions) {
        self.stop_flush_loop();

        let flush_interval = options.flush_interval.max(Duration::from_millis(10));
        let spawn_loop = options.flush_in_thread && !options.disabled;
        {
            let mut buffer = self.lock();
            buffer.options = Some(options);
            buffer.last_flush = Some(Instant::now());
        }

        if spawn_loop {
            let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
            let api = self.api.clone();
            let buffer = Arc::clone(&self.buffer);
            let namespace = self.namespace.clone();
            let constant_tags = self.constant_tags.clone();

            let task = self.worker.handle().spawn(async move {
                loop {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = sleep(flush_interval) => {
                            let (events, series) = lock_buffer(&buffer).drain(namespace.as_deref(), &constant_tags);
                            if let Err(e) = ship(&api, events, series).await {
                                warn!("error flushing buffered datadog payloads: {}", e);
                            }
                        }
                    }
                }
            });

            if let Ok(mut slot) = self.flush_loop.lock() {
                *slot = Some(FlushLoop { stop: stop_tx, task });
            }
        }
        debug!("buffered datadog client started");
    }

    /// Flush what is buffered and stop. Further enqueues are dropped until
    /// [`start`](Self::start) is called again. Idempotent.
    pub fn stop(&self) {
        if self.lock().options.is_none() {
            return;
        }
        self.stop_flush_loop();
        self.flush();
        self.lock().options = None;
        debug!("buffered datadog client stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock().options.is_some()
    }

    fn stop_flush_loop(&self) {
        let running = self.flush_loop.lock().ok().and_then(|mut slot| slot.take());
        if let Some(FlushLoop { stop, task }) = running {
            let _ = stop.send(());
            if let Err(e) = self.worker.block_on(task) {
                warn!("could not join buffered flush loop: {}", e);
            }
        }
    }

    /// Buffer an event.
    pub fn event(&self, event: EventMessage) {
        let flush_due = {
            let mut buffer = self.lock();
            if !accepting(&buffer) {
                return;
            }
            buffer.events.push(event);
            inline_flush_due(&buffer)
        };
        if flush_due {
            self.flush();
        }
    }

    /// Buffer one gauge value, subject to sampling.
    pub fn gauge(&self, name: &str, value: f64, tags: Option<&[String]>, sample_rate: f64) {
        if !should_sample(sample_rate) {
            return;
        }
        let flush_due = {
            let mut buffer = self.lock();
            let Some(options) = buffer.options.as_ref().filter(|o| !o.disabled) else {
                return;
            };
            let roll_up = options.roll_up_interval.as_secs().max(1) as i64;
            let now = Utc::now().timestamp();
            let key = GaugeKey {
                name: name.to_string(),
                tags: tags.map(<[String]>::to_vec).unwrap_or_default(),
                bucket: now - now.rem_euclid(roll_up),
            };
            buffer.gauges.insert(key, value);
            inline_flush_due(&buffer)
        };
        if flush_due {
            self.flush();
        }
    }

    /// Ship everything buffered right now, blocking until done.
    ///
    /// Errors are logged, not returned.
    pub fn flush(&self) {
        let (events, series) = self.lock().drain(self.namespace.as_deref(), &self.constant_tags);
        if events.is_empty() && series.is_empty() {
            return;
        }
        let api = self.api.clone();
        match self.worker.block_on(async move { ship(&api, events, series).await }) {
            Ok(Ok(())) => {}
            Ok(Err(e)) | Err(e) => warn!("error flushing buffered datadog payloads: {}", e),
        }
    }

    #[cfg(test)]
    fn buffered_len(&self) -> (usize, usize) {
        let buffer = self.lock();
        (buffer.events.len(), buffer.gauges.len())
    }
}

impl Drop for BufferedClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_buffer(buffer: &Mutex<Buffer>) -> MutexGuard<'_, Buffer> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn accepting(buffer: &Buffer) -> bool {
    buffer.options.as_ref().map_or(false, |o| !o.disabled)
}

fn inline_flush_due(buffer: &Buffer) -> bool {
    match (&buffer.options, buffer.last_flush) {
        (Some(o), Some(last)) if !o.flush_in_thread => last.elapsed() >= o.flush_interval,
        _ => false,
    }
}

async fn ship(api: &DatadogApi, events: Vec<EventMessage>, series: Vec<Series>) -> Result<(), ApiError> {
    let count = events.len();
    let mut first_err = None;
    for event in &events {
        if let Err(e) = api.create_event(event).await {
            first_err.get_or_insert(e);
        }
    }
    if let Err(e) = api.send_series(&series).await {
        first_err.get_or_insert(e);
    }
    debug!(events = count, series = series.len(), "flushed buffered datadog payloads");
    first_err.map_or(Ok(()), Err)
}

/// Backend that routes messages through a [`BufferedClient`].
///
/// The client is started on construction and stopped by
/// [`Backend::close`] (or when the backend is dropped).
pub struct BufferedBackend {
    client: BufferedClient,
}

impl BufferedBackend {
    pub fn new(api: ApiConfig, config: BufferedClientConfig, options: StartOptions) -> Result<Self, ApiError> {
        let client = BufferedClient::new(api, config)?;
        client.start(options);
        Ok(Self { client })
    }

    pub fn client(&self) -> &BufferedClient {
        &self.client
    }
}

impl Backend for BufferedBackend {
    fn push_message(&self, message: &Message) -> Result<(), BackendError> {
        match message {
            Message::Event(event) => self.client.event(event.clone()),
            Message::Gauge(gauge) => {
                for value in &gauge.values {
                    self.client.gauge(&gauge.metric_name, *value, gauge.tags.as_deref(), gauge.sample_rate);
                }
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.client.stop();
    }
}
