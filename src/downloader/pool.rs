// Bounded worker pool
//
// Blocking work (directory scans, filesystem sweeps) runs on tokio's blocking
// threads, and external processes and browser instances hold a slot while
// they live. One semaphore bounds both so the scheduler threads never block
// and the host is never flooded with ffmpeg or Chromium processes.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::errors::DownloadError;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot. Dropping the permit frees it.
    pub async fn slot(&self) -> Result<OwnedSemaphorePermit, DownloadError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DownloadError::CapabilityUnavailable("worker pool closed".to_string()))
    }

    /// Run a blocking closure off the scheduler threads.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, DownloadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.slot().await?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| DownloadError::Failed(format!("worker task failed: {}", e)))
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}
