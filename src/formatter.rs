use crate::message::{EventMessage, GaugeMessage, Message, MessageKind};
use crate::record::{is_truthy, ClassifyError, LogRecord};
use serde_json::Value;

/// Default record attribute used to select the message variant.
pub const DEFAULT_KIND_ATTRIBUTE: &str = "datadog_todo";

/// Static classification settings shared by every record of a handler.
#[derive(Clone, Debug)]
pub struct FormatterConfig {
    /// Tags merged into every record's `tags`.
    pub tags: Option<Vec<String>>,
    /// Mentions merged into every record's `mentions`.
    pub mentions: Option<Vec<String>>,
    /// Variant used when the record does not select one.
    pub default_kind: MessageKind,
    /// Name of the record attribute holding the variant selector.
    pub kind_attribute: String,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            tags: None,
            mentions: None,
            default_kind: MessageKind::Event,
            kind_attribute: DEFAULT_KIND_ATTRIBUTE.to_string(),
        }
    }
}

/// Turns raw records into [`Message`]s.
#[derive(Clone, Debug, Default)]
pub struct DatadogFormatter {
    config: FormatterConfig,
}

impl DatadogFormatter {
    pub fn new(config: FormatterConfig) -> Self {
        DatadogFormatter { config }
    }

    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    /// Classify `record` and build the matching message.
    ///
    /// The record is augmented in place with the static tags and mentions
    /// before the variant is built, so callers see the merged values.
    pub fn format(&self, record: &mut LogRecord) -> Result<Message, ClassifyError> {
        let kind = self.resolve_kind(record);
        self.patch_record(record);

        match kind {
            MessageKind::Event => {
                let rendered = render_text(record);
                EventMessage::from_record(rendered, record).map(Message::Event)
            }
            MessageKind::Gauge => GaugeMessage::from_record(record).map(Message::Gauge),
        }
    }

    pub fn resolve_kind(&self, record: &LogRecord) -> MessageKind {
        record
            .attr(&self.config.kind_attribute)
            .and_then(MessageKind::from_selector)
            .unwrap_or(self.config.default_kind)
    }

    pub fn patch_record(&self, record: &mut LogRecord) {
        if let Some(mentions) = &self.config.mentions {
            merge_list_attr(record, "mentions", mentions);
        }
        if let Some(tags) = &self.config.tags {
            merge_list_attr(record, "tags", tags);
        }
    }
}

/// Merge static values into a list-valued record attribute.
fn merge_list_attr(record: &mut LogRecord, key: &str, statics: &[String]) {
    let statics = statics.iter().cloned().map(Value::String);

    let merged = match record.attributes.remove(key) {
        Some(Value::Array(mut items)) if !items.is_empty() => {
            items.extend(statics);
            items
        }
        Some(scalar) if !scalar.is_array() && is_truthy(&scalar) => {
            std::iter::once(scalar).chain(statics).collect()
        }
        _ => statics.collect(),
    };

    record.set_attr(key, Value::Array(merged));
}

/// Substitute positional args into the record's message template.
///
/// Each `{}` consumes the next argument; strings are inserted bare. Leftover
/// placeholders stay literal.
pub fn render_text(record: &LogRecord) -> String {
    let args: &[Value] = match &record.args {
        Some(Value::Array(items)) => items,
        Some(other) => std::slice::from_ref(other),
        None => &[],
    };
    if args.is_empty() {
        return record.message.clone();
    }

    let mut out = String::with_capacity(record.message.len());
    let mut args = args.iter();
    let mut rest = record.message.as_str();
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{AlertType, Severity};
    use serde_json::json;

    fn formatter(tags: Option<&[&str]>, mentions: Option<&[&str]>) -> DatadogFormatter {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        DatadogFormatter::new(FormatterConfig {
            tags: tags.map(owned),
            mentions: mentions.map(owned),
            ..FormatterConfig::default()
        })
    }

    fn record() -> LogRecord {
        LogRecord::new(Severity::INFO, "app", "hello")
    }

    #[test]
    fn appends_static_tags_to_record_list() {
        let mut r = record().with_attr("tags", json!(["a"]));
        formatter(Some(&["b"]), None).patch_record(&mut r);
        assert_eq!(r.attr("tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn assigns_static_tags_when_absent() {
        let mut r = record();
        formatter(Some(&["b"]), None).patch_record(&mut r);
        assert_eq!(r.attr("tags"), Some(&json!(["b"])));
    }

    #[test]
    fn wraps_scalar_tag_before_static_tags() {
        let mut r = record().with_attr("tags", "a");
        formatter(Some(&["b"]), None).patch_record(&mut r);
        assert_eq!(r.attr("tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn empty_record_values_are_replaced() {
        let mut r = record().with_attr("tags", json!([])).with_attr("mentions", "");
        formatter(Some(&["b"]), Some(&["@ops"])).patch_record(&mut r);
        assert_eq!(r.attr("tags"), Some(&json!(["b"])));
        assert_eq!(r.attr("mentions"), Some(&json!(["@ops"])));
    }

    #[test]
    fn leaves_record_alone_without_statics() {
        let mut r = record().with_attr("tags", "a");
        formatter(None, None).patch_record(&mut r);
        assert_eq!(r.attr("tags"), Some(&json!("a")));
        assert_eq!(r.attr("mentions"), None);
    }

    #[test]
    fn selects_gauge_from_selector() {
        let mut r = LogRecord::new(Severity::INFO, "app", "q.depth")
            .with_args(json!([5, 7]))
            .with_attr(DEFAULT_KIND_ATTRIBUTE, "gauge");
        match formatter(None, None).format(&mut r).unwrap() {
            Message::Gauge(g) => {
                assert_eq!(g.metric_name, "q.depth");
                assert_eq!(g.values, vec![5.0, 7.0]);
            }
            other => panic!("expected gauge, got {:?}", other),
        }
    }

    #[test]
    fn gauge_without_args_is_zero() {
        let mut r = LogRecord::new(Severity::INFO, "app", "q.depth").with_attr(DEFAULT_KIND_ATTRIBUTE, "gauge");
        match formatter(None, None).format(&mut r).unwrap() {
            Message::Gauge(g) => assert_eq!(g.values, vec![0.0]),
            other => panic!("expected gauge, got {:?}", other),
        }
    }

    #[test]
    fn unknown_selector_uses_default_kind() {
        let f = DatadogFormatter::new(FormatterConfig {
            default_kind: MessageKind::Gauge,
            ..FormatterConfig::default()
        });
        let r = record().with_attr(DEFAULT_KIND_ATTRIBUTE, "histogram");
        assert_eq!(f.resolve_kind(&r), MessageKind::Gauge);
        assert_eq!(f.resolve_kind(&record().with_attr(DEFAULT_KIND_ATTRIBUTE, "event")), MessageKind::Event);
    }

    #[test]
    fn custom_kind_attribute() {
        let f = DatadogFormatter::new(FormatterConfig {
            kind_attribute: "dd_kind".to_string(),
            ..FormatterConfig::default()
        });
        assert_eq!(f.resolve_kind(&record().with_attr("dd_kind", "gauge")), MessageKind::Gauge);
        assert_eq!(f.resolve_kind(&record().with_attr(DEFAULT_KIND_ATTRIBUTE, "gauge")), MessageKind::Event);
    }

    #[test]
    fn event_text_is_rendered_template() {
        let mut r = LogRecord::new(Severity::ERROR, "app", "user {} failed {} times").with_args(json!(["bob", 3]));
        match formatter(None, None).format(&mut r).unwrap() {
            Message::Event(e) => {
                assert_eq!(e.text, "user bob failed 3 times");
                assert_eq!(e.alert_type, Some(AlertType::Error));
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn event_text_carries_mentions() {
        let mut r = record();
        match formatter(None, Some(&["@m1", "@m2"])).format(&mut r).unwrap() {
            Message::Event(e) => assert_eq!(e.text, "hello\n\n@m1 @m2"),
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn out_of_range_severity_has_no_alert_type() {
        let mut r = LogRecord::new(Severity(33), "app", "odd");
        match formatter(None, None).format(&mut r).unwrap() {
            Message::Event(e) => assert_eq!(e.alert_type, None),
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn render_keeps_surplus_placeholders() {
        let r = LogRecord::new(Severity::INFO, "app", "{} and {}").with_args(json!(["a"]));
        assert_eq!(render_text(&r), "a and {}");
        assert_eq!(render_text(&LogRecord::new(Severity::INFO, "app", "{} raw")), "{} raw");
    }
}
