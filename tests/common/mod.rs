// tests/common/mod.rs

//! Shared test environment: a real engine instance backed by temp
//! directories, with the dispatch queue held open so tests can decide
//! exactly when background jobs run.

#![allow(dead_code)]

use restatic::config::Config;
use restatic::core::dispatch::{Dispatcher, Job, JobExecutor};
use restatic::core::generator::{RenderCallback, callback_from_fn};
use restatic::core::orchestrator::Orchestrator;
use restatic::core::state::AppState;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// A complete engine wired against temp directories. The job queue has
/// no worker attached; tests drain it explicitly with
/// [`TestContext::drain_jobs`].
pub struct TestContext {
    pub state: Arc<AppState>,
    pub orchestrator: Arc<Orchestrator>,
    pub dispatcher: Arc<Dispatcher>,
    pub executor: Arc<JobExecutor>,
    pub job_tx: mpsc::Sender<Job>,
    pub job_rx: mpsc::Receiver<Job>,
    _tmp: TempDir,
}

impl TestContext {
    /// Creates a test context with default configuration.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Creates a test context, letting the caller adjust the
    /// configuration before validation.
    pub async fn with_config(mutate: impl FnOnce(&mut Config)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = tmp.path().join("cache").to_string_lossy().into_owned();
        config.cache.lock_dir = tmp.path().join("locks").to_string_lossy().into_owned();
        mutate(&mut config);
        config.validate().unwrap();

        let state = AppState::initialize(config).unwrap();
        let (job_tx, job_rx) = mpsc::channel(64);
        let executor = Arc::new(JobExecutor::new(state.clone()));
        let dispatcher = Arc::new(Dispatcher::standard(job_tx.clone(), executor.clone()));
        let orchestrator = Arc::new(Orchestrator::new(state.clone(), dispatcher.clone()));

        Self {
            state,
            orchestrator,
            dispatcher,
            executor,
            job_tx,
            job_rx,
            _tmp: tmp,
        }
    }

    /// Executes every queued background job, exactly as the worker would
    /// after the responses went out. Returns how many jobs ran.
    pub async fn drain_jobs(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(job) = self.job_rx.try_recv() {
            let _ = self.executor.execute(job).await;
            drained += 1;
        }
        drained
    }

    /// Closes the queue so the dispatcher falls back to inline execution.
    pub fn close_queue(&mut self) {
        self.job_rx.close();
    }
}

/// A callback producing fixed markup while counting its invocations.
pub fn counting_callback(html: &'static str) -> (RenderCallback, Arc<AtomicU64>) {
    delayed_counting_callback(html, std::time::Duration::ZERO)
}

/// Like [`counting_callback`], with an artificial generation delay.
pub fn delayed_counting_callback(
    html: &'static str,
    delay: std::time::Duration,
) -> (RenderCallback, Arc<AtomicU64>) {
    let calls = Arc::new(AtomicU64::new(0));
    let calls_in_callback = calls.clone();
    let callback = callback_from_fn(move |_params| {
        let calls = calls_in_callback.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(html.to_string())
        }
    });
    (callback, calls)
}
