// src/core/tasks/lock_cleaner.rs

use crate::core::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A task that periodically sweeps expired and corrupt lock artifacts
/// from the lock directory, so locks orphaned by crashed holders never
/// accumulate.
pub struct LockCleanerTask {
    state: Arc<AppState>,
}

impl LockCleanerTask {
    /// Creates a new `LockCleanerTask`.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Runs the main loop for the lock cleaner task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.state.config.background.lock_sweep_seconds);
        info!(
            "Lock cleaner task started. Sweep interval: {:?}",
            interval
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.state.locks.cleanup_expired();
                    if removed > 0 {
                        debug!("Lock cleaner removed {} expired lock artifacts.", removed);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Lock cleaner task shutting down.");
                    return;
                }
            }
        }
    }
}
