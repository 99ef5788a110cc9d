//! Worker pool for blocking or CPU-heavy helpers.
//!
//! Jobs run on tokio's blocking threads; a semaphore bounds how many run at
//! once. Shutdown rejects new jobs and waits a bounded time for running ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    permits: Arc<Semaphore>,
    size: usize,
    stopping: AtomicBool,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        info!("Worker pool started with {} workers", size);
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(size)),
                size,
                stopping: AtomicBool::new(false),
            }),
        }
    }

    /// Run `job` on a worker and wait for its result.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.stopping.load(Ordering::SeqCst) {
            bail!("worker pool is shutting down");
        }
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("worker pool is shut down"))?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        Ok(handle.await?)
    }

    /// Stop accepting jobs and wait up to `grace` for running ones.
    pub async fn shutdown(&self, grace: Duration) {
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        let all = u32::try_from(self.inner.size).unwrap_or(u32::MAX);
        match tokio::time::timeout(grace, self.inner.permits.acquire_many(all)).await {
            Ok(Ok(permits)) => permits.forget(),
            Ok(Err(_)) => {}
            Err(_) => warn!("Worker pool still busy after {:?}, abandoning running jobs", grace),
        }
        self.inner.permits.close();
        info!("Worker pool stopped");
    }
}
