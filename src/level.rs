use serde::Serialize;
use std::fmt;

/// Numeric severity of a log record.
///
/// Levels follow the classic logging scale so that any numeric value can be
/// carried by a record, including ones that have no Datadog alert type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Severity(pub u8);

impl Severity {
    pub const TRACE: Severity = Severity(5);
    pub const DEBUG: Severity = Severity(10);
    pub const INFO: Severity = Severity(20);
    pub const WARNING: Severity = Severity(30);
    pub const ERROR: Severity = Severity(40);
    pub const CRITICAL: Severity = Severity(50);

    /// Datadog alert type for this severity, `None` when the level is not
    /// one of the five known ones.
    pub fn alert_type(self) -> Option<AlertType> {
        alert_type_for(self)
    }

    fn name(self) -> Option<&'static str> {
        match self {
            Severity::TRACE => Some("TRACE"),
            Severity::DEBUG => Some("DEBUG"),
            Severity::INFO => Some("INFO"),
            Severity::WARNING => Some("WARNING"),
            Severity::ERROR => Some("ERROR"),
            Severity::CRITICAL => Some("CRITICAL"),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Level {}", self.0),
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::TRACE,
            tracing::Level::DEBUG => Severity::DEBUG,
            tracing::Level::INFO => Severity::INFO,
            tracing::Level::WARN => Severity::WARNING,
            tracing::Level::ERROR => Severity::ERROR,
        }
    }
}

/// Alert type attached to Datadog events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Info,
    Warning,
    Error,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Info => "info",
            AlertType::Warning => "warning",
            AlertType::Error => "error",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a severity onto a Datadog alert type.
///
/// Total over all inputs: unknown severities yield `None`.
pub fn alert_type_for(severity: Severity) -> Option<AlertType> {
    match severity {
        Severity::DEBUG | Severity::INFO => Some(AlertType::Info),
        Severity::WARNING => Some(AlertType::Warning),
        Severity::ERROR | Severity::CRITICAL => Some(AlertType::Error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Severity::DEBUG, Some(AlertType::Info))]
    #[case(Severity::INFO, Some(AlertType::Info))]
    #[case(Severity::WARNING, Some(AlertType::Warning))]
    #[case(Severity::ERROR, Some(AlertType::Error))]
    #[case(Severity::CRITICAL, Some(AlertType::Error))]
    #[case(Severity::TRACE, None)]
    #[case(Severity(0), None)]
    #[case(Severity(35), None)]
    #[case(Severity(255), None)]
    fn maps_severity_to_alert_type(#[case] severity: Severity, #[case] expected: Option<AlertType>) {
        assert_eq!(alert_type_for(severity), expected);
    }

    #[test]
    fn tracing_levels_keep_their_order() {
        let levels = [
            tracing::Level::TRACE,
            tracing::Level::DEBUG,
            tracing::Level::INFO,
            tracing::Level::WARN,
            tracing::Level::ERROR,
        ];
        let severities: Vec<Severity> = levels.iter().map(|l| Severity::from(*l)).collect();
        let mut sorted = severities.clone();
        sorted.sort();
        assert_eq!(severities, sorted);
        assert_eq!(Severity::from(tracing::Level::WARN), Severity::WARNING);
    }

    #[test]
    fn displays_unknown_levels_numerically() {
        assert_eq!(Severity::ERROR.to_string(), "ERROR");
        assert_eq!(Severity(42).to_string(), "Level 42");
    }
}
