// src/core/orchestrator.rs

//! The per-request state machine.
//!
//! Each request runs the same fixed pipeline: admission, key derivation,
//! store read, freshness verdict, then one of the serve paths — fresh,
//! stale (with a background regeneration), or the locked miss path. The
//! client is never made to wait on regeneration of existing content;
//! only a true miss generates inline, under the cross-process lock.

use crate::core::classifier::{RequestClassifier, RequestView};
use crate::core::dispatch::{Dispatcher, TaskKind, regenerate_params};
use crate::core::freshness;
use crate::core::generator::{CallbackParams, ContentGenerator, GenerationResult, RenderCallback};
use crate::core::keys::{CacheKey, VariantMap};
use crate::core::response::{CacheDisposition, ResponseEnvelope, ResponseMeta, ResponseSender};
use crate::core::state::AppState;
use crate::core::store::{CacheEntry, META_URL, epoch_seconds};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ceiling on how long a miss-path request waits for another process to
/// finish generating the same key.
const MISS_LOCK_MAX_WAIT: Duration = Duration::from_secs(5);
/// Poll interval while waiting on the miss-path lock.
const MISS_LOCK_RETRY: Duration = Duration::from_millis(100);

/// Where the page producer for a request comes from. Background
/// regeneration requires a registry name; inline closures serve the
/// synchronous paths.
#[derive(Clone)]
pub enum CallbackSource {
    Inline(RenderCallback),
    Named(String),
}

/// Per-request rendering options.
#[derive(Clone, Default)]
pub struct RenderOptions {
    pub variants: VariantMap,
    /// Freshness TTL for a newly written entry; store default when unset.
    pub ttl: Option<u64>,
    /// Registry name used by background regeneration jobs. Defaults to
    /// the source name when the source is [`CallbackSource::Named`].
    pub callback_name: Option<String>,
    pub callback_params: CallbackParams,
    /// Generation timeout (detection only).
    pub timeout: Option<Duration>,
    /// Registry name of a fallback producer used when the primary fails.
    pub fallback_name: Option<String>,
}

/// Wires admission, keying, store, locks, generation, and dispatch into
/// the request pipeline.
pub struct Orchestrator {
    state: Arc<AppState>,
    dispatcher: Arc<Dispatcher>,
    classifier: RequestClassifier,
    sender: ResponseSender,
}

impl Orchestrator {
    pub fn new(state: Arc<AppState>, dispatcher: Arc<Dispatcher>) -> Self {
        let sender = ResponseSender::new(
            state.config.compression.enabled,
            state.config.compression.level,
        );
        Self {
            state,
            dispatcher,
            classifier: RequestClassifier::default(),
            sender,
        }
    }

    pub fn sender(&self) -> &ResponseSender {
        &self.sender
    }

    /// Handles one request end to end, always producing an envelope.
    pub async fn handle(
        &self,
        request: &RequestView,
        url: &str,
        source: CallbackSource,
        options: RenderOptions,
    ) -> ResponseEnvelope {
        let accept_encoding = request.headers.get("accept-encoding").cloned();
        let accept_encoding = accept_encoding.as_deref();

        let Some(callback) = self.resolve_callback(&source) else {
            let name = match &source {
                CallbackSource::Named(name) => name.as_str(),
                CallbackSource::Inline(_) => "<inline>",
            };
            warn!("No callback available for '{url}' (source '{name}').");
            return self.sender.error_response("page producer not registered");
        };

        let decision = self.classifier.classify(request);
        if !decision.cacheable {
            debug!(
                "Bypassing cache for '{}': {} ({}).",
                url, decision.reason, decision.rule_triggered
            );
            return self
                .bypass(&callback, &options, url, accept_encoding)
                .await;
        }

        let cache_url = if decision.strip_query_for_key {
            url.split('?').next().unwrap_or(url)
        } else {
            url
        };
        let key = CacheKey::derive(cache_url, &options.variants);

        match self.state.store.read(key.as_str()).await {
            None => {
                self.miss_path(&key, cache_url, &callback, &options, accept_encoding)
                    .await
            }
            Some(entry) => {
                let verdict = freshness::classify(
                    entry.created_at,
                    entry.ttl,
                    self.state.config.freshness.stale_window_seconds,
                    epoch_seconds(),
                );
                if verdict.is_fresh() {
                    self.state.stats.record_hit();
                    self.serve_entry(&entry, CacheDisposition::Fresh, &verdict, accept_encoding)
                } else if verdict.is_stale() {
                    self.stale_path(&key, cache_url, &entry, &verdict, &source, &options, accept_encoding)
                        .await
                } else {
                    self.miss_path(&key, cache_url, &callback, &options, accept_encoding)
                        .await
                }
            }
        }
    }

    fn resolve_callback(&self, source: &CallbackSource) -> Option<RenderCallback> {
        match source {
            CallbackSource::Inline(callback) => Some(callback.clone()),
            CallbackSource::Named(name) => self.state.registry.get(name),
        }
    }

    /// The registry name background jobs will use, when one exists.
    fn background_name(&self, source: &CallbackSource, options: &RenderOptions) -> Option<String> {
        options.callback_name.clone().or(match source {
            CallbackSource::Named(name) => Some(name.clone()),
            CallbackSource::Inline(_) => None,
        })
    }

    async fn generate(
        &self,
        callback: &RenderCallback,
        options: &RenderOptions,
        url: &str,
    ) -> GenerationResult {
        let fallback = options
            .fallback_name
            .as_deref()
            .and_then(|name| self.state.registry.get(name));
        let result = match fallback {
            Some(fallback) => {
                ContentGenerator::execute_with_fallback(
                    callback,
                    &fallback,
                    options.callback_params.clone(),
                    options.timeout,
                    Some(url),
                )
                .await
            }
            None => {
                ContentGenerator::execute(
                    callback,
                    options.callback_params.clone(),
                    options.timeout,
                    Some(url),
                )
                .await
            }
        };
        if result.success {
            self.state.stats.record_generation();
        } else {
            self.state.stats.record_generation_failure();
        }
        result
    }

    /// Non-cacheable request: generate and send, touching no state.
    async fn bypass(
        &self,
        callback: &RenderCallback,
        options: &RenderOptions,
        url: &str,
        accept_encoding: Option<&str>,
    ) -> ResponseEnvelope {
        self.state.stats.record_bypass();
        let result = self.generate(callback, options, url).await;
        if !result.success {
            return self
                .sender
                .error_response("page generation failed");
        }
        let meta = ResponseMeta {
            generation_ms: Some(result.elapsed_ms),
            ..Default::default()
        };
        self.send(200, result.html, CacheDisposition::Bypass, meta, accept_encoding)
    }

    fn serve_entry(
        &self,
        entry: &CacheEntry,
        disposition: CacheDisposition,
        verdict: &freshness::Verdict,
        accept_encoding: Option<&str>,
    ) -> ResponseEnvelope {
        let meta = ResponseMeta {
            age_seconds: Some(verdict.age_seconds),
            expires_in_seconds: Some(verdict.expires_in_seconds),
            ..Default::default()
        };
        self.send(200, entry.content.clone(), disposition, meta, accept_encoding)
    }

    /// Stale entry: serve it immediately and schedule a rebuild, unless
    /// another process is already regenerating this key.
    #[allow(clippy::too_many_arguments)]
    async fn stale_path(
        &self,
        key: &CacheKey,
        url: &str,
        entry: &CacheEntry,
        verdict: &freshness::Verdict,
        source: &CallbackSource,
        options: &RenderOptions,
        accept_encoding: Option<&str>,
    ) -> ResponseEnvelope {
        self.state.stats.record_stale_serve();

        if self.state.locks.is_locked(key.as_str()) {
            debug!("Key '{key}' is already being regenerated elsewhere.");
            return self.serve_entry(
                entry,
                CacheDisposition::StaleRegenerating,
                verdict,
                accept_encoding,
            );
        }

        match self.background_name(source, options) {
            Some(callback_name) => {
                let params = regenerate_params(
                    url,
                    key.as_str(),
                    &callback_name,
                    &options.callback_params,
                    options.ttl.unwrap_or(entry.ttl),
                    &options.variants,
                );
                if let Err(e) = self.dispatcher.dispatch(TaskKind::Regenerate, params).await {
                    warn!("Failed to schedule regeneration for '{url}': {e}");
                }
            }
            None => {
                warn!(
                    "Serving '{url}' stale without rebuild: inline callback has no registry name."
                );
            }
        }

        self.serve_entry(entry, CacheDisposition::Stale, verdict, accept_encoding)
    }

    /// Absent or expired entry: generate under the cross-process lock.
    async fn miss_path(
        &self,
        key: &CacheKey,
        url: &str,
        callback: &RenderCallback,
        options: &RenderOptions,
        accept_encoding: Option<&str>,
    ) -> ResponseEnvelope {
        let lock_result = self
            .state
            .locks
            .acquire_with_wait(
                key.as_str(),
                self.state.config.background.timeout,
                MISS_LOCK_MAX_WAIT,
                MISS_LOCK_RETRY,
            )
            .await
            .unwrap_or_else(|e| {
                warn!("Lock acquisition failed for '{key}': {e}");
                Default::default()
            });

        if !lock_result.locked {
            // Another holder may have just published; serve that instead
            // of generating a duplicate.
            if let Some(entry) = self.state.store.read(key.as_str()).await {
                let verdict = freshness::classify(
                    entry.created_at,
                    entry.ttl,
                    self.state.config.freshness.stale_window_seconds,
                    epoch_seconds(),
                );
                self.state.stats.record_hit();
                return self.serve_entry(
                    &entry,
                    CacheDisposition::Locked,
                    &verdict,
                    accept_encoding,
                );
            }
            warn!(
                "Generating '{url}' without the lock after waiting out a holder that published nothing."
            );
            self.state.stats.record_miss();
            let result = self.generate(callback, options, url).await;
            if !result.success {
                return self.sender.error_response("page generation failed");
            }
            let meta = ResponseMeta {
                generation_ms: Some(result.elapsed_ms),
                ..Default::default()
            };
            return self.send(200, result.html, CacheDisposition::Miss, meta, accept_encoding);
        }

        if lock_result.waited {
            // We only got the lock after waiting a holder out; it may
            // have published while we slept. Serving that copy keeps the
            // generation single-flight.
            if let Some(entry) = self.state.store.read(key.as_str()).await {
                self.state.locks.release(key.as_str());
                let verdict = freshness::classify(
                    entry.created_at,
                    entry.ttl,
                    self.state.config.freshness.stale_window_seconds,
                    epoch_seconds(),
                );
                self.state.stats.record_hit();
                return self.serve_entry(
                    &entry,
                    CacheDisposition::Locked,
                    &verdict,
                    accept_encoding,
                );
            }
        }

        self.state.stats.record_miss();
        let result = self.generate(callback, options, url).await;
        if !result.success {
            self.state.locks.release(key.as_str());
            return self.sender.error_response("page generation failed");
        }

        let ttl = options.ttl.unwrap_or(self.state.store.default_ttl());
        let mut metadata = HashMap::new();
        metadata.insert(META_URL.to_string(), Value::from(url));
        metadata.insert(
            "variants".to_string(),
            Value::Object(
                options
                    .variants
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            ),
        );
        metadata.insert("generated_at".to_string(), Value::from(epoch_seconds()));

        if let Err(e) = self
            .state
            .store
            .write(key.as_str(), result.html.clone(), Some(ttl), metadata)
            .await
        {
            warn!("Failed to persist generated entry for '{url}': {e}");
        }
        self.state.locks.release(key.as_str());

        let meta = ResponseMeta {
            generation_ms: Some(result.elapsed_ms),
            expires_in_seconds: Some(ttl as i64),
            ..Default::default()
        };
        self.send(200, result.html, CacheDisposition::Miss, meta, accept_encoding)
    }

    fn send(
        &self,
        status: u16,
        body: bytes::Bytes,
        disposition: CacheDisposition,
        meta: ResponseMeta,
        accept_encoding: Option<&str>,
    ) -> ResponseEnvelope {
        match self
            .sender
            .prepare(status, body, disposition, &meta, accept_encoding, false)
        {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to prepare response: {e}");
                self.sender.error_response("response preparation failed")
            }
        }
    }
}
