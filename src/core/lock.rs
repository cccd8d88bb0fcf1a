// src/core/lock.rs

//! Cross-process mutual exclusion per cache key, coordinated entirely
//! through the filesystem.
//!
//! The sole synchronization point is the exclusive-create file operation
//! (`O_CREAT | O_EXCL`): of any number of concurrent acquirers, exactly
//! one creates the lock artifact. Locks expire so that a crashed holder
//! cannot wedge a key; expired and corrupt artifacts are reclaimed by the
//! next acquirer or by the periodic cleaner.

use crate::core::errors::RestaticError;
use crate::core::store::epoch_seconds;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Suffix identifying a persisted lock artifact.
const LOCK_SUFFIX: &str = ".lock";

/// An unparseable artifact younger than this is a holder mid-publish
/// (created, content not yet flushed) and must be treated as held, not
/// reclaimed.
const CORRUPT_RECLAIM_GRACE: Duration = Duration::from_secs(2);

/// The persisted lock artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockArtifact {
    pub lock_id: String,
    pub key: String,
    pub acquired_at: u64,
    pub expires_at: u64,
    pub owner_pid: u32,
}

/// Outcome of a single acquisition attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireResult {
    pub locked: bool,
    pub lock_id: Option<String>,
    pub expires_at: Option<u64>,
    /// Another non-expired holder exists.
    pub already_locked: bool,
    /// Set by [`LockManager::acquire_with_wait`] when the wait budget ran
    /// out without an acquisition.
    pub timeout_waiting: bool,
    /// Set by [`LockManager::acquire_with_wait`] when at least one retry
    /// was needed; the caller raced another holder and should re-check
    /// shared state before doing work.
    pub waited: bool,
}

/// Manages lock artifacts under a single directory.
#[derive(Debug)]
pub struct LockManager {
    dir: PathBuf,
}

impl LockManager {
    /// Opens (and creates if needed) the lock directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RestaticError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{hash}{LOCK_SUFFIX}"))
    }

    /// Attempts to take the lock for `key`, valid for `timeout` seconds.
    ///
    /// An expired or unparseable artifact at the path is reclaimed first.
    /// Failure to create because the artifact exists is reported as
    /// `already_locked`, never as an error.
    pub fn acquire(&self, key: &str, timeout: u64) -> Result<AcquireResult, RestaticError> {
        let path = self.lock_path(key);
        reclaim_if_stale(&path);

        let now = epoch_seconds();
        let artifact = LockArtifact {
            lock_id: Uuid::new_v4().to_string(),
            key: key.to_string(),
            acquired_at: now,
            expires_at: now + timeout,
            owner_pid: std::process::id(),
        };
        let encoded = serde_json::to_vec(&artifact)?;

        let created = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        let mut file = match created {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(AcquireResult {
                    already_locked: true,
                    ..Default::default()
                });
            }
            Err(e) => return Err(RestaticError::LockingError(e.to_string())),
        };

        if let Err(e) = file.write_all(&encoded) {
            // The artifact exists but is unusable; remove it so the key
            // does not stay wedged until expiry.
            let _ = std::fs::remove_file(&path);
            return Err(RestaticError::LockingError(e.to_string()));
        }

        debug!("Acquired lock '{}' for key '{}'.", artifact.lock_id, key);
        Ok(AcquireResult {
            locked: true,
            lock_id: Some(artifact.lock_id),
            expires_at: Some(artifact.expires_at),
            ..Default::default()
        })
    }

    /// Retries [`LockManager::acquire`] every `retry_interval` until it
    /// succeeds or `max_wait` has elapsed.
    pub async fn acquire_with_wait(
        &self,
        key: &str,
        timeout: u64,
        max_wait: Duration,
        retry_interval: Duration,
    ) -> Result<AcquireResult, RestaticError> {
        let started = Instant::now();
        let mut waited = false;
        loop {
            let result = self.acquire(key, timeout)?;
            if result.locked {
                return Ok(AcquireResult { waited, ..result });
            }
            if started.elapsed() >= max_wait {
                return Ok(AcquireResult {
                    timeout_waiting: true,
                    waited,
                    ..result
                });
            }
            waited = true;
            tokio::time::sleep(retry_interval).await;
        }
    }

    /// Deletes the lock artifact for `key`, returning the holder's
    /// `lock_id` when one could be read (for observability; no ownership
    /// check is performed).
    pub fn release(&self, key: &str) -> Option<String> {
        let path = self.lock_path(key);
        let lock_id = read_lock(&path).map(|artifact| artifact.lock_id);
        match std::fs::remove_file(&path) {
            Ok(()) => lock_id,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to release lock for key '{}': {e}", key);
                None
            }
        }
    }

    /// True only while a non-expired artifact is present; expired and
    /// corrupt artifacts are reclaimed on the way.
    pub fn is_locked(&self, key: &str) -> bool {
        let path = self.lock_path(key);
        reclaim_if_stale(&path);
        path.exists()
    }

    /// Sweeps the lock directory, removing every expired artifact along
    /// with corrupt ones past the publish grace. Returns the number
    /// removed.
    pub fn cleanup_expired(&self) -> usize {
        self.sweep(|path| match read_lock(path) {
            Some(artifact) => artifact.expires_at <= epoch_seconds(),
            None => std::fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age >= CORRUPT_RECLAIM_GRACE),
        })
    }

    /// Removes every lock artifact regardless of expiry. Returns the
    /// number removed.
    pub fn release_all(&self) -> usize {
        self.sweep(|_| true)
    }

    fn sweep(&self, should_remove: impl Fn(&Path) -> bool) -> usize {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        let mut removed = 0;
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            let is_lock = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(LOCK_SUFFIX));
            if !is_lock {
                continue;
            }
            if should_remove(&path) && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

fn read_lock(path: &Path) -> Option<LockArtifact> {
    let raw = std::fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Removes the artifact at `path` when it is expired or unparseable, so
/// the caller's create attempt can proceed.
fn reclaim_if_stale(path: &Path) {
    if !path.exists() {
        return;
    }
    match read_lock(path) {
        Some(artifact) if artifact.expires_at > epoch_seconds() => {}
        Some(artifact) => {
            debug!(
                "Reclaiming expired lock '{}' (pid {}).",
                artifact.lock_id, artifact.owner_pid
            );
            let _ = std::fs::remove_file(path);
        }
        None => {
            let age = std::fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok());
            if age.is_some_and(|age| age >= CORRUPT_RECLAIM_GRACE) {
                warn!("Reclaiming corrupt lock artifact {}.", path.display());
                let _ = std::fs::remove_file(path);
            }
        }
    }
}
