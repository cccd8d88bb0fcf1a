// src/core/dispatch/mod.rs

//! Background job dispatch.
//!
//! Work whose execution must wait until after the HTTP response has been
//! handed to the network layer is enqueued as a [`Job`] carrying only
//! by-value parameters; callables are referenced by registry name, never
//! by value. The dispatcher delegates to the first available
//! [`DispatchHandler`]: normally the worker queue, with synchronous
//! inline execution as the degraded fallback when no worker is running.

pub mod dispatcher;
pub mod regenerate;
pub mod worker;

pub use dispatcher::{Dispatcher, InlineHandler, QueueHandler};
pub use regenerate::JobExecutor;
pub use worker::JobWorker;

use crate::core::errors::RestaticError;
use crate::core::generator::CallbackParams;
use crate::core::keys::VariantMap;
use crate::core::store::epoch_seconds;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// The kinds of background work the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Regenerate,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Regenerate => "regenerate",
        }
    }
}

/// One queued unit of background work. Params must be serializable by
/// value; live closures never cross this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub task: TaskKind,
    pub params: HashMap<String, Value>,
    pub enqueued_at: u64,
}

impl Job {
    pub fn new(task: TaskKind, params: HashMap<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task,
            params,
            enqueued_at: epoch_seconds(),
        }
    }
}

/// Receipt handed back to the enqueuing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub queued: bool,
    pub job_id: String,
    /// Which strategy took the job: `worker-queue` or `inline`.
    pub method_used: &'static str,
}

/// A dispatch strategy. Handlers are probed in priority order; the first
/// available one takes the job.
#[async_trait]
pub trait DispatchHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_available(&self) -> bool;
    async fn dispatch(&self, job: Job) -> Result<(), RestaticError>;
}

/// Builds the parameter map for a `regenerate` job.
pub fn regenerate_params(
    url: &str,
    cache_key: &str,
    callback_name: &str,
    callback_params: &CallbackParams,
    ttl: u64,
    variants: &VariantMap,
) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    params.insert("url".to_string(), Value::from(url));
    params.insert("cache_key".to_string(), Value::from(cache_key));
    params.insert("callback_name".to_string(), Value::from(callback_name));
    params.insert(
        "callback_params".to_string(),
        Value::Object(callback_params.clone().into_iter().collect()),
    );
    params.insert("ttl".to_string(), Value::from(ttl));
    params.insert(
        "variants".to_string(),
        Value::Object(
            variants
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect(),
        ),
    );
    params
}
