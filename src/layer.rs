use crate::handler::{is_dispatching, DatadogHandler};
use crate::level::Severity;
use crate::record::LogRecord;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Fields whose text is parsed as a JSON array when possible, so that
/// `args = ?[5, 7]` or `tags = ?["a", "b"]` arrive as lists.
const LIST_FIELDS: &[&str] = &["args", "tags", "mentions"];

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// hands them to a [`DatadogHandler`] on the emitting thread.
///
/// Events less severe than the configured level are ignored, as are events
/// raised while a handler is already dispatching on the same thread.
pub struct DatadogLayer {
    handler: Arc<DatadogHandler>,
    level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events forwarded to the handler.
    pub forwarded_events: Arc<AtomicU64>,
}

impl DatadogLayer {
    pub fn new(handler: Arc<DatadogHandler>, level: Level) -> Self {
        Self {
            handler,
            level,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn handler(&self) -> &Arc<DatadogHandler> {
        &self.handler
    }
}

/// Build a [`LogRecord`] from a `tracing` event.
pub fn record_from_event(event: &Event<'_>) -> LogRecord {
    let mut fields = BTreeMap::new();
    let mut message: Option<String> = None;

    let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
    event.record(&mut visitor);

    let meta = event.metadata();
    let args = fields.remove("args");
    LogRecord {
        timestamp: Utc::now(),
        severity: Severity::from(*meta.level()),
        name: meta.target().to_string(),
        message: message.unwrap_or_default(),
        args,
        attributes: fields,
    }
}

impl<S> Layer<S> for DatadogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if *event.metadata().level() > self.level || is_dispatching() {
            return;
        }

        let record = record_from_event(event);
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
        self.handler.emit(record);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert_text(&mut self, field: &Field, text: String) {
        let value = if LIST_FIELDS.contains(&field.name()) {
            match serde_json::from_str::<Value>(&text) {
                Ok(list @ Value::Array(_)) => list,
                _ => Value::String(text),
            }
        } else {
            Value::String(text)
        };
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert_text(field, value.to_string());
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert_text(field, format!("{:?}", value));
        }
    }
}
