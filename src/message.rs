//! Typed Datadog payloads built from log records.

use crate::level::AlertType;
use crate::record::{ClassifyError, LogRecord};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Variant selector for [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Event,
    Gauge,
}

impl MessageKind {
    /// Parse the value of the kind-selector attribute.
    pub fn from_selector(value: &Value) -> Option<MessageKind> {
        match value.as_str() {
            Some("event") => Some(MessageKind::Event),
            Some("gauge") => Some(MessageKind::Gauge),
            _ => None,
        }
    }
}

/// Event priority understood by Datadog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// A Datadog payload. Exactly one variant per record.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Event(EventMessage),
    Gauge(GaugeMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Event(_) => MessageKind::Event,
            Message::Gauge(_) => MessageKind::Gauge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<AlertType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type_name: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds_option", skip_serializing_if = "Option::is_none")]
    pub date_happened: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(rename = "host", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl EventMessage {
    /// Build an event from a record whose body has already been rendered.
    ///
    /// `rendered` is the template with args substituted; mentions from the
    /// record are appended after a blank line. A missing or `null` `title`
    /// falls back to the record name, since the API requires a title.
    pub fn from_record(rendered: String, record: &LogRecord) -> Result<Self, ClassifyError> {
        let text = match record.string_list_attr("mentions")? {
            Some(mentions) => format!("{}\n\n{}", rendered, mentions.join(" ")),
            None => rendered,
        };

        Ok(EventMessage {
            title: record.str_attr("title")?.unwrap_or_else(|| record.name.clone()),
            text,
            alert_type: record.severity.alert_type(),
            aggregation_key: record.str_attr("aggregation_key")?,
            source_type_name: record.str_attr("source_type_name")?,
            date_happened: date_attr(record, "date_happened")?,
            priority: priority_attr(record, "priority")?,
            tags: record.string_list_attr("tags")?,
            hostname: record.str_attr("hostname")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeMessage {
    pub metric_name: String,
    pub values: Vec<f64>,
    pub tags: Option<Vec<String>>,
    pub sample_rate: f64,
}

impl GaugeMessage {
    pub fn from_record(record: &LogRecord) -> Result<Self, ClassifyError> {
        let values = match &record.args {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|item| {
                    item.as_f64()
                        .ok_or_else(|| ClassifyError::invalid("args", format!("gauge value {} is not a number", item)))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => vec![0.0],
        };

        Ok(GaugeMessage {
            metric_name: record.message.clone(),
            values,
            tags: record.string_list_attr("tags")?,
            sample_rate: record.f64_attr("sample_rate")?.unwrap_or(1.0),
        })
    }
}

fn date_attr(record: &LogRecord, key: &str) -> Result<Option<DateTime<Utc>>, ClassifyError> {
    match record.attr(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(Some)
            .ok_or_else(|| ClassifyError::invalid(key, "expected unix seconds")),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| ClassifyError::invalid(key, e.to_string())),
        Some(_) => Err(ClassifyError::invalid(key, "expected unix seconds or an RFC 3339 date")),
    }
}

fn priority_attr(record: &LogRecord, key: &str) -> Result<Option<Priority>, ClassifyError> {
    match record.str_attr(key)?.as_deref() {
        None => Ok(None),
        Some("normal") => Ok(Some(Priority::Normal)),
        Some("low") => Ok(Some(Priority::Low)),
        Some(other) => Err(ClassifyError::invalid(key, format!("unknown priority {:?}", other))),
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Event(e) => write!(f, "event {:?}", e.title),
            Message::Gauge(g) => write!(f, "gauge {} {:?}", g.metric_name, g.values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Severity;
    use serde_json::json;

    #[test]
    fn gauge_takes_metric_name_and_values() {
        let record = LogRecord::new(Severity::INFO, "app", "q.depth").with_args(json!([5, 7]));
        let gauge = GaugeMessage::from_record(&record).unwrap();
        assert_eq!(gauge.metric_name, "q.depth");
        assert_eq!(gauge.values, vec![5.0, 7.0]);
        assert_eq!(gauge.sample_rate, 1.0);
        assert_eq!(gauge.tags, None);
    }

    #[test]
    fn gauge_defaults_to_zero() {
        let absent = LogRecord::new(Severity::INFO, "app", "m");
        let empty = absent.clone().with_args(json!([]));
        let scalar = absent.clone().with_args(json!(3));

        for record in [absent, empty, scalar] {
            assert_eq!(GaugeMessage::from_record(&record).unwrap().values, vec![0.0]);
        }
    }

    #[test]
    fn gauge_rejects_non_numeric_values() {
        let record = LogRecord::new(Severity::INFO, "app", "m").with_args(json!([1, "two"]));
        let err = GaugeMessage::from_record(&record).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidField { ref field, .. } if field == "args"));
    }

    #[test]
    fn event_falls_back_to_record_name_for_title() {
        let record = LogRecord::new(Severity::WARNING, "billing", "ignored");
        let event = EventMessage::from_record("body".to_string(), &record).unwrap();
        assert_eq!(event.title, "billing");
        assert_eq!(event.text, "body");
        assert_eq!(event.alert_type, Some(AlertType::Warning));

        let record = record.with_attr("title", Value::Null);
        let event = EventMessage::from_record("body".to_string(), &record).unwrap();
        assert_eq!(event.title, "billing");
    }

    #[test]
    fn event_reads_optional_fields() {
        let record = LogRecord::new(Severity::ERROR, "billing", "x")
            .with_attr("title", "Charge failed")
            .with_attr("priority", "low")
            .with_attr("date_happened", 1_700_000_000)
            .with_attr("hostname", "web-1")
            .with_attr("aggregation_key", "charge")
            .with_attr("mentions", json!(["@a", "@b"]));
        let event = EventMessage::from_record("body".to_string(), &record).unwrap();

        assert_eq!(event.title, "Charge failed");
        assert_eq!(event.text, "body\n\n@a @b");
        assert_eq!(event.priority, Some(Priority::Low));
        assert_eq!(event.date_happened.map(|d| d.timestamp()), Some(1_700_000_000));
        assert_eq!(event.hostname.as_deref(), Some("web-1"));
        assert_eq!(event.aggregation_key.as_deref(), Some("charge"));
    }

    #[test]
    fn event_rejects_unknown_priority() {
        let record = LogRecord::new(Severity::ERROR, "billing", "x").with_attr("priority", "urgent");
        assert!(EventMessage::from_record(String::new(), &record).is_err());
    }
}
