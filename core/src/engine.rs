//! Process-wide worker pool
//!
//! One engine is built at process start and shared by every instance. Guest
//! resumes are CPU-bound, so they run on the runtime's blocking pool, whose
//! size is the configured worker count.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;

pub struct Engine {
    runtime: Option<Runtime>,
}

impl Engine {
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let thread_name = config.thread_name.clone();
        let niceness = config.niceness;
        let counter = AtomicUsize::new(0);

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads.max(1))
            .thread_name_fn(move || {
                let id = counter.fetch_add(1, Ordering::Relaxed);
                format!("{}-{}", thread_name, id)
            })
            .on_thread_start(move || lower_priority(niceness))
            .enable_time()
            .build()
            .context("Failed to build worker pool runtime")?;

        tracing::info!(
            worker_threads = config.worker_threads,
            thread_name = %config.thread_name,
            "Worker pool started"
        );

        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Run `task` on the worker pool
    pub fn spawn<F, R>(&self, task: F) -> Option<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.runtime
            .as_ref()
            .map(|runtime| runtime.spawn_blocking(task))
    }

    /// Wait up to `timeout` for in-flight tasks, then drop the pool
    pub fn shutdown(mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);
            tracing::info!("Worker pool stopped");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(unix)]
fn lower_priority(niceness: i32) {
    // Failure leaves the thread at normal priority
    unsafe {
        libc::nice(niceness);
    }
}

#[cfg(not(unix))]
fn lower_priority(_niceness: i32) {}
