// src/core/store/entry.rs

//! The persisted cache entry artifact.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata key reserved by the invalidation purger: the canonical URL
/// this entry was rendered for.
pub const META_URL: &str = "url";

/// One cached page: the rendered bytes plus the bookkeeping needed for
/// freshness classification and pattern purging. Serialized as a single
/// self-describing JSON artifact; `content` round-trips as raw bytes via
/// the `bytes` serde support.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub content: Bytes,
    /// Wall-clock write time, epoch seconds.
    pub created_at: u64,
    /// Freshness TTL in seconds; `0` means never expire.
    pub ttl: u64,
    /// Free-form user metadata. The `url` key is reserved by the purger.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl CacheEntry {
    /// Builds an entry stamped with the current wall clock.
    pub fn new(content: Bytes, ttl: u64, metadata: HashMap<String, Value>) -> Self {
        Self {
            content,
            created_at: epoch_seconds(),
            ttl,
            metadata,
        }
    }

    /// The entry's `metadata.url`, when present and a string.
    pub fn url(&self) -> Option<&str> {
        self.metadata.get(META_URL).and_then(Value::as_str)
    }
}

/// Current wall clock as integer epoch seconds.
pub fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
