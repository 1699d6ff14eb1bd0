//! Async runtime for suspending calls and stream pumping
//!
//! Built lazily from [`crate::config::RuntimeConfig`] on first use and kept
//! for the life of the process.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::config::config;
use crate::error::binding_error;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The bridge's runtime
pub fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let settings = &config().runtime;
        let runtime = Builder::new_multi_thread()
            .worker_threads(settings.worker_threads.max(1))
            .thread_name(settings.thread_name.clone())
            .enable_all()
            .build()
            .unwrap_or_else(|e| binding_error(format!("cannot start bridge runtime: {}", e)));
        tracing::debug!(
            workers = settings.worker_threads,
            name = %settings.thread_name,
            "bridge runtime started"
        );
        runtime
    })
}

/// Spawn a task on the bridge runtime
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    runtime().spawn(future)
}

/// Run blocking work (foreign calls that do not return until done)
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    runtime().spawn_blocking(f)
}
