use crate::backend::{Backend, BackendError};
use crate::message::Message;

/// A backend that simply drops all messages.
///
/// Useful for measuring the overhead of classification itself without any
/// network I/O, and for tests that don't care about delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBackend;

impl Backend for NoopBackend {
    fn push_message(&self, _message: &Message) -> Result<(), BackendError> {
        Ok(())
    }
}
