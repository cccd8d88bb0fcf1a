// src/core/dispatch/dispatcher.rs

//! The dispatcher and its two built-in strategies.

use super::{DispatchHandler, DispatchReceipt, Job, JobExecutor, TaskKind};
use crate::core::errors::RestaticError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Routes jobs to the first available handler.
pub struct Dispatcher {
    handlers: Vec<Arc<dyn DispatchHandler>>,
}

impl Dispatcher {
    pub fn new(handlers: Vec<Arc<dyn DispatchHandler>>) -> Self {
        Self { handlers }
    }

    /// The standard strategy stack: worker queue first, inline execution
    /// as the fallback.
    pub fn standard(queue_tx: mpsc::Sender<Job>, executor: Arc<JobExecutor>) -> Self {
        Self::new(vec![
            Arc::new(QueueHandler::new(queue_tx)),
            Arc::new(InlineHandler::new(executor)),
        ])
    }

    /// Assigns a job id, hands the job to a handler, and reports which
    /// strategy took it. Failure of a preferred handler falls through to
    /// the next one; only exhaustion of all handlers is an error.
    pub async fn dispatch(
        &self,
        task: TaskKind,
        params: HashMap<String, Value>,
    ) -> Result<DispatchReceipt, RestaticError> {
        let job = Job::new(task, params);
        for handler in &self.handlers {
            if !handler.is_available() {
                continue;
            }
            let job_id = job.id.clone();
            match handler.dispatch(job.clone()).await {
                Ok(()) => {
                    debug!(
                        "Dispatched job '{}' ({}) via {}.",
                        job_id,
                        task.as_str(),
                        handler.name()
                    );
                    return Ok(DispatchReceipt {
                        queued: true,
                        job_id,
                        method_used: handler.name(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Dispatch handler '{}' rejected job '{}': {e}",
                        handler.name(),
                        job_id
                    );
                }
            }
        }
        Err(RestaticError::DispatchError(
            "no dispatch handler accepted the job".into(),
        ))
    }

    /// Sequential convenience wrapper over [`Dispatcher::dispatch`].
    pub async fn dispatch_batch(
        &self,
        jobs: Vec<(TaskKind, HashMap<String, Value>)>,
    ) -> Vec<Result<DispatchReceipt, RestaticError>> {
        let mut receipts = Vec::with_capacity(jobs.len());
        for (task, params) in jobs {
            receipts.push(self.dispatch(task, params).await);
        }
        receipts
    }
}

/// Preferred strategy: enqueue onto the bounded worker channel. The
/// worker drains the queue on its own task, strictly after the enqueuing
/// request has handed its response off.
pub struct QueueHandler {
    tx: mpsc::Sender<Job>,
}

impl QueueHandler {
    pub fn new(tx: mpsc::Sender<Job>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl DispatchHandler for QueueHandler {
    fn name(&self) -> &'static str {
        "worker-queue"
    }

    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn dispatch(&self, job: Job) -> Result<(), RestaticError> {
        // try_send: a saturated queue falls through to the next strategy
        // instead of blocking the request.
        self.tx
            .try_send(job)
            .map_err(|e| RestaticError::DispatchError(e.to_string()))
    }
}

/// Degraded strategy: run the job synchronously before returning to the
/// caller. Used when no worker is draining the queue.
pub struct InlineHandler {
    executor: Arc<JobExecutor>,
}

impl InlineHandler {
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl DispatchHandler for InlineHandler {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn dispatch(&self, job: Job) -> Result<(), RestaticError> {
        self.executor.execute(job).await
    }
}
