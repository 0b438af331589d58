//! Worker pool for offloading slow message handling.
//!
//! Input threads dispatch synchronously, so a handler that blocks stalls
//! every later message from its client. Handlers pass such work to a
//! [`WorkerPool`], a Tokio multi-thread runtime owned by the server:
//! blocking closures go through [`post`](WorkerPool::post), async work
//! through [`spawn`](WorkerPool::spawn).

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::SessionError;

/// A shared pool of worker threads.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    runtime: Runtime,
}

impl WorkerPool {
    /// Starts a pool with `worker_threads` async workers. Blocking work
    /// runs on Tokio's separate blocking thread set.
    ///
    /// # Errors
    /// [`SessionError::Spawn`] if the runtime's threads can't be created.
    pub fn new(name: impl Into<String>, worker_threads: usize) -> Result<Self, SessionError> {
        let name = name.into();
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(name.clone())
            .enable_all()
            .build()
            .map_err(|source| SessionError::Spawn {
                what: format!("worker pool {name}"),
                source,
            })?;

        tracing::debug!(pool = %name, worker_threads, "worker pool started");
        Ok(Self { name, runtime })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs a blocking closure on the pool.
    pub fn post<F, R>(&self, work: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.runtime.spawn_blocking(work)
    }

    /// Runs a future on the pool.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// A handle that can spawn onto this pool from anywhere.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Stops the pool, waiting up to `timeout` for running work.
    pub fn shutdown(self, timeout: Duration) {
        tracing::debug!(pool = %self.name, "worker pool stopping");
        self.runtime.shutdown_timeout(timeout);
    }
}
