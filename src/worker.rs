//! Dedicated thread driving the async HTTP client.
//!
//! Log calls happen on arbitrary threads, inside or outside a Tokio runtime.
//! The worker owns its own current-thread runtime so blocking on a request
//! never touches the caller's runtime.

use crate::api::ApiError;
use std::future::Future;
use std::sync::{mpsc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;

pub(crate) struct ApiWorker {
    runtime: Handle,
    thread_id: ThreadId,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ApiWorker {
    pub(crate) fn spawn(name: &str) -> Result<Self, ApiError> {
        let (handle_tx, handle_rx) = mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            // Anything logged from this thread must not loop back into a handler.
            crate::handler::suppress_current_thread();

            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = handle_tx.send(Err(e));
                    return;
                }
            };
            let _ = handle_tx.send(Ok(runtime.handle().clone()));
            runtime.block_on(async {
                let _ = shutdown_rx.await;
            });
        })?;

        let runtime = handle_rx.recv().map_err(|_| ApiError::WorkerGone)??;
        Ok(ApiWorker {
            runtime,
            thread_id: thread.thread().id(),
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.runtime
    }

    /// Run `fut` on the worker and block the calling thread until it
    /// completes.
    pub(crate) fn block_on<F, T>(&self, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return Err(ApiError::WorkerReentrant);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.runtime.spawn(async move {
            let _ = tx.send(fut.await);
        });
        rx.recv().map_err(|_| ApiError::WorkerGone)
    }

    /// Stop the runtime and join the thread. Pending tasks are dropped.
    pub(crate) fn shutdown(&self) {
        let sender = self.shutdown.lock().ok().and_then(|mut s| s.take());
        let Some(sender) = sender else {
            return;
        };
        let _ = sender.send(());

        let thread = self.thread.lock().ok().and_then(|mut t| t.take());
        if let Some(thread) = thread {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                debug!("api worker thread panicked");
            }
        }
    }
}

impl Drop for ApiWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
