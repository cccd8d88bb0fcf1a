// src/core/dispatch/worker.rs

//! The background job worker: drains the dispatch queue one job at a
//! time, after the enqueuing requests have handed off their responses.

use super::{Job, JobExecutor};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Single-consumer worker over the dispatch channel. Jobs run
/// sequentially; regeneration concurrency across keys is bounded by the
/// cross-process locks, not by worker parallelism.
pub struct JobWorker {
    pub rx: mpsc::Receiver<Job>,
    pub executor: Arc<JobExecutor>,
}

impl JobWorker {
    pub fn new(rx: mpsc::Receiver<Job>, executor: Arc<JobExecutor>) -> Self {
        Self { rx, executor }
    }

    /// Runs the drain loop until shutdown. Jobs still queued at shutdown
    /// are discarded; background work does not outlive the process.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Background job worker started.");
        loop {
            tokio::select! {
                maybe_job = self.rx.recv() => {
                    let Some(job) = maybe_job else {
                        info!("Dispatch queue closed; job worker exiting.");
                        return;
                    };
                    let job_id = job.id.clone();
                    let task = job.task;
                    if let Err(e) = self.executor.execute(job).await {
                        warn!(
                            "Background job '{}' ({}) failed: {e}",
                            job_id,
                            task.as_str()
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Background job worker shutting down.");
                    return;
                }
            }
        }
    }
}
