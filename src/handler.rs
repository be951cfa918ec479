use crate::backend::{Backend, BackendError};
use crate::formatter::{DatadogFormatter, FormatterConfig};
use crate::level::Severity;
use crate::record::{ClassifyError, LogRecord};
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Mark the current thread so that records logged on it are ignored.
#[cfg_attr(not(feature = "api"), allow(dead_code))]
pub(crate) fn suppress_current_thread() {
    DISPATCHING.with(|d| d.set(true));
}

/// Whether a handler is dispatching on the current thread (or the thread
/// belongs to a backend worker).
pub fn is_dispatching() -> bool {
    DISPATCHING.with(Cell::get)
}

struct DispatchGuard;

impl DispatchGuard {
    fn enter() -> Option<Self> {
        DISPATCHING.with(|d| {
            if d.get() {
                None
            } else {
                d.set(true);
                Some(DispatchGuard)
            }
        })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(false));
    }
}

/// Failure caught at the handler boundary.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("cannot classify record: {0}")]
    Classify(#[from] ClassifyError),

    #[error("cannot push message: {0}")]
    Push(#[from] BackendError),

    /// A backend or formatter panicked.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

/// Receives every failure of [`DatadogHandler::emit`], keyed by the record
/// that caused it.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, record: &LogRecord, error: &HandlerError);
}

/// Default reporter: prints the failure and the offending record to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrReporter;

impl ErrorReporter for StderrReporter {
    fn report(&self, record: &LogRecord, error: &HandlerError) {
        eprintln!(
            "--- Logging error ---\n{}\nRecord: name={} severity={} message={:?}",
            error, record.name, record.severity, record.message
        );
    }
}

/// Counters updated by the handler.
#[derive(Debug, Default)]
pub struct HandlerStats {
    /// Records that passed the level check.
    pub seen: AtomicU64,
    /// Records delivered to the backend without error.
    pub emitted: AtomicU64,
    /// Records whose failure was handed to the reporter.
    pub failed: AtomicU64,
}

/// Handler settings, fixed at construction.
#[derive(Clone, Debug, Default)]
pub struct HandlerConfig {
    pub formatter: FormatterConfig,
    /// Minimum severity of emitted records; `None` emits everything.
    pub level: Option<Severity>,
}

/// Log sink that classifies records and forwards the resulting messages to
/// a [`Backend`].
///
/// `emit` never fails and never panics: every error is given to the
/// [`ErrorReporter`] exactly once.
pub struct DatadogHandler {
    formatter: DatadogFormatter,
    backend: Arc<dyn Backend>,
    level: Option<Severity>,
    reporter: Arc<dyn ErrorReporter>,
    stats: Arc<HandlerStats>,
}

impl DatadogHandler {
    pub fn new(backend: Arc<dyn Backend>, config: HandlerConfig) -> Self {
        DatadogHandler {
            formatter: DatadogFormatter::new(config.formatter),
            backend,
            level: config.level,
            reporter: Arc::new(StderrReporter),
            stats: Arc::new(HandlerStats::default()),
        }
    }

    /// Replace the error reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn stats(&self) -> Arc<HandlerStats> {
        Arc::clone(&self.stats)
    }

    pub fn formatter(&self) -> &DatadogFormatter {
        &self.formatter
    }

    /// Classify `record` and push it to the backend.
    pub fn emit(&self, mut record: LogRecord) {
        if self.level.map_or(false, |min| record.severity < min) {
            return;
        }
        // A backend logging through `tracing` must not feed back into us.
        let Some(_guard) = DispatchGuard::enter() else {
            return;
        };
        self.stats.seen.fetch_add(1, Ordering::Relaxed);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&mut record)))
            .unwrap_or_else(|payload| Err(HandlerError::ContractViolation(panic_message(payload.as_ref()))));

        match result {
            Ok(()) => {
                self.stats.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                let reporter = &self.reporter;
                let _ = panic::catch_unwind(AssertUnwindSafe(|| reporter.report(&record, &error)));
            }
        }
    }

    fn dispatch(&self, record: &mut LogRecord) -> Result<(), HandlerError> {
        let message = self.formatter.format(record)?;
        self.backend.push_message(&message)?;
        Ok(())
    }

    /// Release backend resources. The handler keeps accepting records; what
    /// happens to them afterwards is up to the backend.
    pub fn close(&self) {
        self.backend.close();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked".to_string()
    }
}
