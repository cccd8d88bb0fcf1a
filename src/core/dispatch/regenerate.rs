// src/core/dispatch/regenerate.rs

//! Executes queued jobs, in particular the `regenerate` task.

use super::{Job, TaskKind};
use crate::core::errors::RestaticError;
use crate::core::generator::{CallbackParams, ContentGenerator};
use crate::core::keys::VariantMap;
use crate::core::state::AppState;
use crate::core::store::META_URL;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Knows how to run each [`TaskKind`] against the shared state.
pub struct JobExecutor {
    state: Arc<AppState>,
}

impl JobExecutor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn execute(&self, job: Job) -> Result<(), RestaticError> {
        match job.task {
            TaskKind::Regenerate => self.regenerate(&job).await,
        }
    }

    /// Rebuilds one cached page: take the cross-process lock (skip
    /// silently when another regenerator holds it), resolve the callback
    /// by name, generate, publish with the original TTL and metadata.
    async fn regenerate(&self, job: &Job) -> Result<(), RestaticError> {
        let params = RegenerateParams::parse(&job.params)?;

        let lock = self
            .state
            .locks
            .acquire(&params.cache_key, self.state.config.background.timeout)?;
        if !lock.locked {
            debug!(
                "Skipping regeneration of '{}': another process holds the lock.",
                params.url
            );
            return Ok(());
        }

        let outcome = self.regenerate_locked(&params).await;
        self.state.locks.release(&params.cache_key);
        outcome
    }

    async fn regenerate_locked(&self, params: &RegenerateParams) -> Result<(), RestaticError> {
        let Some(callback) = self.state.registry.get(&params.callback_name) else {
            error!(
                "Cannot regenerate '{}': callback '{}' is not registered.",
                params.url, params.callback_name
            );
            return Err(RestaticError::CallbackNotFound(
                params.callback_name.clone(),
            ));
        };

        let result = ContentGenerator::execute(
            &callback,
            params.callback_params.clone(),
            None,
            Some(&params.url),
        )
        .await;

        if !result.success {
            self.state.stats.record_generation_failure();
            return Err(RestaticError::GenerationFailed(
                result.error.unwrap_or_else(|| "unknown failure".into()),
            ));
        }
        self.state.stats.record_generation();

        let mut metadata = HashMap::new();
        metadata.insert(META_URL.to_string(), Value::from(params.url.as_str()));
        metadata.insert(
            "variants".to_string(),
            Value::Object(
                params
                    .variants
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            ),
        );
        metadata.insert(
            "generated_at".to_string(),
            Value::from(crate::core::store::epoch_seconds()),
        );

        self.state
            .store
            .write(
                &params.cache_key,
                result.html,
                Some(params.ttl),
                metadata,
            )
            .await?;

        info!(
            "Regenerated '{}' in {}ms (key {}).",
            params.url, result.elapsed_ms, params.cache_key
        );
        Ok(())
    }
}

/// Typed view of a `regenerate` job's parameter map.
struct RegenerateParams {
    url: String,
    cache_key: String,
    callback_name: String,
    callback_params: CallbackParams,
    ttl: u64,
    variants: VariantMap,
}

impl RegenerateParams {
    fn parse(params: &HashMap<String, Value>) -> Result<Self, RestaticError> {
        let required = |field: &str| {
            params
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    RestaticError::InvalidRequest(format!(
                        "regenerate job is missing the '{field}' param"
                    ))
                })
        };

        let callback_params = params
            .get("callback_params")
            .and_then(Value::as_object)
            .map(|object| object.clone().into_iter().collect())
            .unwrap_or_default();

        let variants = params
            .get("variants")
            .and_then(Value::as_object)
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            url: required("url")?,
            cache_key: required("cache_key")?,
            callback_name: required("callback_name")?,
            callback_params,
            ttl: params.get("ttl").and_then(Value::as_u64).unwrap_or(0),
            variants,
        })
    }
}
