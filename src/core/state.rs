// src/core/state.rs

//! Process-wide shared state.
//!
//! Everything here is initialized once at startup and read-only
//! thereafter; per-request state lives on the request handler. The
//! filesystem (store directory, lock directory) is the only coordination
//! substrate shared with other processes.

use crate::config::Config;
use crate::core::errors::RestaticError;
use crate::core::lock::LockManager;
use crate::core::registry::CallbackRegistry;
use crate::core::stats::StatsRecorder;
use crate::core::store::CacheStore;
use std::sync::Arc;

/// Immutable bundle of the long-lived services.
pub struct AppState {
    pub config: Config,
    pub store: Arc<CacheStore>,
    pub locks: Arc<LockManager>,
    pub registry: Arc<CallbackRegistry>,
    pub stats: Arc<StatsRecorder>,
}

impl AppState {
    /// Builds the shared state from a validated configuration, creating
    /// the store and lock directories as needed.
    pub fn initialize(config: Config) -> Result<Arc<Self>, RestaticError> {
        let store = CacheStore::new(
            &config.cache.dir,
            config.cache.default_ttl,
            config.cache.use_sharding,
            config.freshness.stale_window_seconds,
        )?;
        let locks = LockManager::new(&config.cache.lock_dir)?;
        let stats = StatsRecorder::new(config.stats.enabled);

        Ok(Arc::new(Self {
            config,
            store: Arc::new(store),
            locks: Arc::new(locks),
            registry: Arc::new(CallbackRegistry::new()),
            stats: Arc::new(stats),
        }))
    }
}
