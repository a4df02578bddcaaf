//! Deferred build worker.
//!
//! A single long-lived Tokio task that drains the build queue: claim the
//! oldest pending task, render its target, persist the artifact. Render
//! failures mark the task failed and keep the worker going; a later
//! retry pass may requeue them.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sumi_core::error::CoreError;
use sumi_core::ports::{BuildQueue, PageRenderer, PageStore};

/// Default polling interval for the worker loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct DeferredBuildWorker {
    queue: Arc<dyn BuildQueue>,
    pages: Arc<dyn PageStore>,
    renderer: Arc<dyn PageRenderer>,
    poll_interval: Duration,
}

impl DeferredBuildWorker {
    /// Create a worker with the default 1-second poll interval.
    pub fn new(
        queue: Arc<dyn BuildQueue>,
        pages: Arc<dyn PageStore>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self { queue, pages, renderer, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the worker loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Build worker started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Build worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.drain().await {
                        tracing::error!(error = %e, "Build cycle failed");
                    }
                }
            }
        }
    }

    /// Process queued tasks until the queue is empty.
    ///
    /// Returns the number of tasks completed successfully. Per-task
    /// render failures are recorded on the task, not returned.
    pub async fn drain(&self) -> Result<u64, CoreError> {
        let mut completed = 0;
        while let Some(task) = self.queue.claim_next().await? {
            match self.build(&task.target).await {
                Ok(()) => {
                    self.queue.mark_done(task.id).await?;
                    completed += 1;
                    tracing::debug!(
                        task_id = task.id,
                        target = %task.target.artifact_key(),
                        "Page built",
                    );
                }
                Err(e) => {
                    tracing::error!(
                        task_id = task.id,
                        target = %task.target.artifact_key(),
                        error = %e,
                        "Page build failed",
                    );
                    self.queue.mark_failed(task.id, &e.to_string()).await?;
                }
            }
        }
        Ok(completed)
    }

    async fn build(&self, target: &sumi_core::build::BuildTarget) -> Result<(), CoreError> {
        let bytes = self.renderer.render(target).await?;
        self.pages.write(target, &bytes).await
    }
}
