// src/core/tasks/store_pruner.rs

//! A background task that removes expired cache entries and orphaned
//! temp files from the store directory.
//!
//! Expired entries are already evicted lazily on read; the pruner exists
//! for entries nobody requests anymore, which would otherwise sit on
//! disk until their key is asked for again.

use crate::core::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// The background task struct for the store pruner.
pub struct StorePrunerTask {
    state: Arc<AppState>,
}

impl StorePrunerTask {
    /// Creates a new `StorePrunerTask`.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// The main run loop for the pruner task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.state.config.background.prune_interval_seconds);
        info!("Store pruner task started. Prune interval: {:?}", interval);
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.state.store.prune().await;
                    if removed > 0 {
                        debug!("Store pruner removed {} expired entries.", removed);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Store pruner task shutting down.");
                    return;
                }
            }
        }
    }
}
