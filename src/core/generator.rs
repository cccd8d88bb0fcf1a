// src/core/generator.rs

//! Executes user-supplied page callbacks and converts every possible
//! outcome into a structured [`GenerationResult`].
//!
//! A callback may return its markup directly or stream bytes into the
//! [`RenderSink`] it receives; a returned value takes precedence over
//! sink output. Errors and panics are captured, never propagated, and a
//! failed invocation discards whatever the sink accumulated. Timeouts are
//! detected after the fact, not enforced: a runaway callback runs to
//! completion and its result is marked failed.

use bytes::Bytes;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// By-value parameters handed to a callback at invocation time.
pub type CallbackParams = HashMap<String, Value>;

/// Byte sink available to a callback for incremental output.
#[derive(Debug, Default)]
pub struct RenderSink {
    buf: Mutex<Vec<u8>>,
}

impl RenderSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends bytes to the captured output.
    pub fn emit(&self, bytes: impl AsRef<[u8]>) {
        self.lock_buf().extend_from_slice(bytes.as_ref());
    }

    fn take(&self) -> Bytes {
        Bytes::from(std::mem::take(&mut *self.lock_buf()))
    }

    // A panicking callback poisons the mutex; its buffer is discarded on
    // failure, so recover the guard instead of propagating.
    fn lock_buf(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A page producer. Returning `Some(bytes)` overrides anything emitted
/// through the sink; returning `None` publishes the sink contents.
pub type RenderCallback = Arc<
    dyn Fn(Arc<RenderSink>, CallbackParams) -> BoxFuture<'static, anyhow::Result<Option<Bytes>>>
        + Send
        + Sync,
>;

/// Wraps a plain async producer returning markup into a [`RenderCallback`].
pub fn callback_from_fn<F, Fut>(producer: F) -> RenderCallback
where
    F: Fn(CallbackParams) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(move |_sink, params| {
        let fut = producer(params);
        Box::pin(async move { fut.await.map(|html| Some(Bytes::from(html))) })
    })
}

/// The structured outcome of one callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub success: bool,
    /// Empty whenever `success` is false.
    pub html: Bytes,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl GenerationResult {
    fn failure(error: String, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            html: Bytes::new(),
            elapsed_ms,
            error: Some(error),
        }
    }
}

/// Stateless executor for [`RenderCallback`]s.
pub struct ContentGenerator;

impl ContentGenerator {
    /// Runs one callback, capturing output, faults, and elapsed time.
    pub async fn execute(
        callback: &RenderCallback,
        params: CallbackParams,
        timeout: Option<Duration>,
        url: Option<&str>,
    ) -> GenerationResult {
        let sink = RenderSink::new();
        let started = Instant::now();

        // The callback runs on its own task so a panic is contained and
        // surfaces as a JoinError instead of unwinding through us.
        let outcome = tokio::spawn(callback(sink.clone(), params)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(Ok(Some(html))) => GenerationResult {
                success: true,
                html,
                elapsed_ms,
                error: None,
            },
            Ok(Ok(None)) => GenerationResult {
                success: true,
                html: sink.take(),
                elapsed_ms,
                error: None,
            },
            Ok(Err(e)) => {
                warn!(
                    "Page callback failed for '{}': {e:#}",
                    url.unwrap_or("<unknown>")
                );
                GenerationResult::failure(format!("{e:#}"), elapsed_ms)
            }
            Err(join_error) => {
                warn!(
                    "Page callback panicked for '{}': {join_error}",
                    url.unwrap_or("<unknown>")
                );
                GenerationResult::failure(format!("callback panicked: {join_error}"), elapsed_ms)
            }
        };

        if let Some(limit) = timeout
            && result.elapsed_ms > limit.as_millis() as u64
        {
            debug!(
                "Generation for '{}' took {}ms, over the {}ms limit.",
                url.unwrap_or("<unknown>"),
                result.elapsed_ms,
                limit.as_millis()
            );
            result = GenerationResult::failure(
                format!(
                    "generation took {}ms, exceeding the {}ms timeout",
                    result.elapsed_ms,
                    limit.as_millis()
                ),
                result.elapsed_ms,
            );
        }

        result
    }

    /// Runs a set of callbacks sequentially, preserving input key order.
    pub async fn execute_batch(
        callbacks: IndexMap<String, (RenderCallback, CallbackParams)>,
    ) -> IndexMap<String, GenerationResult> {
        let mut results = IndexMap::with_capacity(callbacks.len());
        for (name, (callback, params)) in callbacks {
            let result = Self::execute(&callback, params, None, Some(&name)).await;
            results.insert(name, result);
        }
        results
    }

    /// Runs `primary`; on failure, runs `fallback` through the same
    /// pipeline and returns its result instead.
    pub async fn execute_with_fallback(
        primary: &RenderCallback,
        fallback: &RenderCallback,
        params: CallbackParams,
        timeout: Option<Duration>,
        url: Option<&str>,
    ) -> GenerationResult {
        let result = Self::execute(primary, params.clone(), timeout, url).await;
        if result.success {
            return result;
        }
        warn!(
            "Primary callback failed for '{}' ({}); running fallback.",
            url.unwrap_or("<unknown>"),
            result.error.as_deref().unwrap_or("no error recorded")
        );
        Self::execute(fallback, params, timeout, url).await
    }

    /// True iff the callback produces non-whitespace output.
    pub async fn verify(callback: &RenderCallback) -> bool {
        let result = Self::execute(callback, CallbackParams::new(), None, None).await;
        result.success && result.html.iter().any(|b| !b.is_ascii_whitespace())
    }
}
