// src/core/store/mod.rs

//! The on-disk cache store: a process-safe key/value of rendered pages
//! with per-entry TTL and free-form metadata.
//!
//! Writers publish atomically by writing a sibling temp file and renaming
//! it over the final path; a published artifact is never truncated in
//! place. Readers take a shared advisory lock for the duration of a read,
//! so concurrent readers never block each other and never observe a torn
//! artifact. Expired entries are evicted lazily on read and by the
//! periodic pruner.

pub mod entry;
pub mod paths;

pub use entry::{CacheEntry, META_URL, epoch_seconds};

use crate::core::errors::RestaticError;
use crate::core::freshness;
use bytes::Bytes;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// Grace period before an orphaned temp file is garbage collected, so an
/// in-flight writer is never swept mid-publish.
const TEMP_FILE_GRACE: Duration = Duration::from_secs(300);

/// Aggregate store counters, as reported by [`CacheStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
    pub bytes: u64,
}

/// Filesystem-backed cache store rooted at a single directory.
///
/// The store knows the configured stale window so that lazy eviction only
/// removes entries that are past serve-stale range; an entry inside the
/// stale window is still readable and is the orchestrator's to classify.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    default_ttl: u64,
    use_sharding: bool,
    stale_window: Option<u64>,
}

impl CacheStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        default_ttl: u64,
        use_sharding: bool,
        stale_window: Option<u64>,
    ) -> Result<Self, RestaticError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            default_ttl,
            use_sharding,
            stale_window,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        paths::entry_path(&self.root, key, self.use_sharding)
    }

    fn is_past_serving(&self, entry: &CacheEntry) -> bool {
        freshness::classify(
            entry.created_at,
            entry.ttl,
            self.stale_window,
            epoch_seconds(),
        )
        .is_expired()
    }

    /// Atomically persists an entry under `key`, replacing any previous
    /// one. `ttl = None` uses the store default; `metadata` is stored
    /// verbatim.
    pub async fn write(
        &self,
        key: &str,
        content: Bytes,
        ttl: Option<u64>,
        metadata: HashMap<String, Value>,
    ) -> Result<(), RestaticError> {
        if key.is_empty() {
            return Err(RestaticError::InvalidRequest(
                "cache key must not be empty".into(),
            ));
        }

        let entry = CacheEntry::new(content, ttl.unwrap_or(self.default_ttl), metadata);
        let encoded = serde_json::to_vec(&entry)?;

        let final_path = self.entry_path(key);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Publish via temp file + rename in the same directory, so readers
        // only ever observe a complete artifact.
        let temp_path = final_path.with_extension(format!("cache.tmp.{}", rand::random::<u32>()));
        fs::write(&temp_path, &encoded).await?;
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            warn!(
                "Failed to publish cache entry '{}': {e}. Removing temp file.",
                key
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!("Stored cache entry '{}' ({} bytes).", key, encoded.len());
        Ok(())
    }

    /// Reads the entry under `key`. Absent, unparseable, and expired
    /// artifacts all read as `None`; the latter two are removed
    /// best-effort. I/O failures are logged and read as `None`.
    pub async fn read(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let entry = match read_artifact(&path) {
            ArtifactRead::Entry(entry) => entry,
            ArtifactRead::Absent => return None,
            ArtifactRead::Corrupt => {
                warn!("Removing corrupt cache artifact for key '{}'.", key);
                let _ = fs::remove_file(&path).await;
                return None;
            }
        };

        if self.is_past_serving(&entry) {
            let _ = fs::remove_file(&path).await;
            return None;
        }
        Some(entry)
    }

    /// Removes the entry under `key`. Returns whether an artifact existed.
    pub async fn delete(&self, key: &str) -> bool {
        fs::remove_file(self.entry_path(key)).await.is_ok()
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.read(key).await.is_some()
    }

    /// All non-expired storage keys currently present.
    pub async fn list_keys(&self) -> Vec<String> {
        self.list_entries().await.into_keys().collect()
    }

    /// Full mapping of non-expired entries, keyed by storage key.
    pub async fn list_entries(&self) -> HashMap<String, CacheEntry> {
        let mut entries = HashMap::new();
        for path in self.walk_artifacts() {
            let Some(key) = storage_key(&path) else {
                continue;
            };
            if let ArtifactRead::Entry(entry) = read_artifact(&path)
                && !self.is_past_serving(&entry)
            {
                entries.insert(key, entry);
            }
        }
        entries
    }

    /// Removes every entry whose TTL (plus stale window) has elapsed,
    /// along with corrupt artifacts and orphaned temp files. Returns the
    /// number of entries removed.
    pub async fn prune(&self) -> usize {
        let mut removed = 0;
        for path in self.walk_artifacts() {
            let stale = match read_artifact(&path) {
                ArtifactRead::Entry(entry) => self.is_past_serving(&entry),
                ArtifactRead::Corrupt => true,
                ArtifactRead::Absent => false,
            };
            if stale && fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }

        for temp in self.walk_temp_files() {
            let old_enough = std::fs::metadata(&temp)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age >= TEMP_FILE_GRACE);
            if old_enough {
                let _ = fs::remove_file(&temp).await;
            }
        }

        removed
    }

    /// Counts all artifacts on disk, valid and expired, plus their size.
    pub async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for path in self.walk_artifacts() {
            stats.total += 1;
            if let Ok(meta) = std::fs::metadata(&path) {
                stats.bytes += meta.len();
            }
            match read_artifact(&path) {
                ArtifactRead::Entry(entry) if !self.is_past_serving(&entry) => stats.valid += 1,
                _ => stats.expired += 1,
            }
        }
        stats
    }

    /// Sequential convenience wrapper over [`CacheStore::write`]. There is
    /// no atomicity across the batch; the result maps each key to its
    /// individual outcome.
    pub async fn write_batch(
        &self,
        items: Vec<(String, Bytes)>,
        ttl: Option<u64>,
    ) -> IndexMap<String, bool> {
        let mut results = IndexMap::with_capacity(items.len());
        for (key, content) in items {
            let ok = self
                .write(&key, content, ttl, HashMap::new())
                .await
                .is_ok();
            results.insert(key, ok);
        }
        results
    }

    /// Sequential convenience wrapper over [`CacheStore::read`],
    /// preserving input key order.
    pub async fn read_batch(&self, keys: &[String]) -> IndexMap<String, Option<CacheEntry>> {
        let mut results = IndexMap::with_capacity(keys.len());
        for key in keys {
            results.insert(key.clone(), self.read(key).await);
        }
        results
    }

    /// Every `.cache` artifact under the root, at any shard depth.
    fn walk_artifacts(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(&self.root, 0, &mut |path| {
            if storage_key(path).is_some() {
                found.push(path.to_path_buf());
            }
        });
        found
    }

    fn walk_temp_files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(&self.root, 0, &mut |path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.contains(".tmp.") {
                found.push(path.to_path_buf());
            }
        });
        found
    }
}

/// Outcome of reading one artifact file under a shared lock.
enum ArtifactRead {
    Entry(CacheEntry),
    Absent,
    Corrupt,
}

/// Opens the artifact under a shared advisory lock and parses it. The
/// lock spans the whole read; it is released when the handle drops.
fn read_artifact(path: &Path) -> ArtifactRead {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ArtifactRead::Absent,
        Err(e) => {
            warn!("Failed to open cache artifact {}: {e}", path.display());
            return ArtifactRead::Absent;
        }
    };

    // Fully qualified to stay unambiguous next to the std file-lock API.
    if let Err(e) = fs2::FileExt::lock_shared(&file) {
        warn!("Failed to lock cache artifact {}: {e}", path.display());
        return ArtifactRead::Absent;
    }
    let mut raw = Vec::new();
    let read = file.read_to_end(&mut raw);
    let _ = fs2::FileExt::unlock(&file);

    if read.is_err() {
        return ArtifactRead::Absent;
    }
    match serde_json::from_slice(&raw) {
        Ok(entry) => ArtifactRead::Entry(entry),
        Err(_) => ArtifactRead::Corrupt,
    }
}

fn storage_key(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(paths::key_from_file_name)
        .map(str::to_string)
}

/// Depth-limited recursive walk; the sharded layout is at most two
/// directory levels deep.
fn collect_files(dir: &Path, depth: usize, visit: &mut impl FnMut(&Path)) {
    if depth > 2 {
        return;
    }
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    for dir_entry in read_dir.flatten() {
        let path = dir_entry.path();
        if path.is_dir() {
            collect_files(&path, depth + 1, visit);
        } else {
            visit(&path);
        }
    }
}
