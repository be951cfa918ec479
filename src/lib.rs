pub mod level;
pub mod record;
pub mod message;
pub mod formatter;
pub mod handler;
pub mod backend;
pub mod statsd;
pub mod layer;

#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "api")]
pub mod buffered;
#[cfg(feature = "api")]
mod worker;

pub mod env;
pub mod init;
pub mod noop_sink;

pub use backend::{Backend, BackendError};
pub use formatter::{DatadogFormatter, FormatterConfig};
pub use handler::{DatadogHandler, ErrorReporter, HandlerConfig, HandlerError};
pub use level::{AlertType, Severity};
pub use message::{EventMessage, GaugeMessage, Message, MessageKind};
pub use record::{ClassifyError, LogRecord};
