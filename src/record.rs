use crate::level::Severity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Structured log record consumed by the handler.
///
/// Optional named attributes (`title`, `tags`, `mentions`, ...) live in the
/// `attributes` bag. A key that is missing is "absent"; a key holding
/// [`Value::Null`] was set to an explicit null.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Logical logger name (the `tracing` target for layer-built records).
    pub name: String,
    /// Message template, or the metric name for gauges.
    pub message: String,
    /// Positional arguments substituted into the template.
    pub args: Option<Value>,
    pub attributes: BTreeMap<String, Value>,
}

impl LogRecord {
    pub fn new(severity: Severity, name: impl Into<String>, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            severity,
            name: name.into(),
            message: message.into(),
            args: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_args(mut self, args: impl Into<Value>) -> Self {
        self.args = Some(args.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Raw attribute lookup. `None` means absent.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// String attribute; explicit null reads as `None`.
    ///
    /// Numbers and booleans are rendered as text, arrays and objects are
    /// rejected.
    pub fn str_attr(&self, key: &str) -> Result<Option<String>, ClassifyError> {
        match self.attr(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
            Some(_) => Err(ClassifyError::invalid(key, "expected a scalar value")),
        }
    }

    /// Numeric attribute; explicit null reads as `None`.
    pub fn f64_attr(&self, key: &str) -> Result<Option<f64>, ClassifyError> {
        match self.attr(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| ClassifyError::invalid(key, "number out of range")),
            Some(_) => Err(ClassifyError::invalid(key, "expected a number")),
        }
    }

    /// List-of-strings attribute. A scalar is treated as a one-element list.
    pub fn string_list_attr(&self, key: &str) -> Result<Option<Vec<String>>, ClassifyError> {
        match self.attr(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| scalar_to_string(item).ok_or_else(|| ClassifyError::invalid(key, "list items must be scalars")))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => scalar_to_string(other)
                .map(|s| Some(vec![s]))
                .ok_or_else(|| ClassifyError::invalid(key, "expected a list or a scalar")),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

/// Whether a value counts as "set" for attribute merging: null, `false`,
/// zero, empty strings and empty containers do not.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Error raised when record fields cannot be turned into the selected
/// message variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("invalid `{field}` attribute: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ClassifyError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ClassifyError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_severity_as_number() {
        let record = LogRecord::new(Severity::WARNING, "app", "hi").with_attr("title", "t");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["severity"], json!(30));
        assert_eq!(value["attributes"]["title"], json!("t"));
    }

    #[test]
    fn absent_and_null_attributes_differ() {
        let record = LogRecord::new(Severity::INFO, "app", "hi").with_attr("hostname", Value::Null);
        assert_eq!(record.attr("hostname"), Some(&Value::Null));
        assert_eq!(record.attr("title"), None);
        assert_eq!(record.str_attr("hostname").unwrap(), None);
    }

    #[test]
    fn string_lists_accept_scalars() {
        let record = LogRecord::new(Severity::INFO, "app", "hi")
            .with_attr("tags", "env:prod")
            .with_attr("mentions", json!(["@ops", 3]))
            .with_attr("bad", json!([{"a": 1}]));

        assert_eq!(record.string_list_attr("tags").unwrap(), Some(vec!["env:prod".to_string()]));
        assert_eq!(
            record.string_list_attr("mentions").unwrap(),
            Some(vec!["@ops".to_string(), "3".to_string()])
        );
        assert!(record.string_list_attr("bad").is_err());
    }

    #[test]
    fn truthiness_follows_emptiness() {
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("a")));
        assert!(is_truthy(&json!(["a"])));
    }
}
