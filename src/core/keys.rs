// src/core/keys.rs

//! Deterministic cache key derivation.
//!
//! A cache key is a stable fingerprint of a URL plus its variant axes
//! (e.g. `device=mobile`, `language=es`). The same inputs always produce
//! the same key, variant ordering is irrelevant, and the output alphabet
//! is filesystem-safe hex.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// The number of hex characters kept from the digest. 16 hex chars carry
/// 64 bits, which keeps the collision probability below 2^-64 for any
/// realistic keyspace while keeping directory listings readable.
const KEY_HEX_LEN: usize = 16;

/// A map of variant axis name to value. `BTreeMap` keeps the canonical
/// encoding order-independent by construction.
pub type VariantMap = BTreeMap<String, String>;

/// An opaque, filesystem-safe fingerprint of `(url, variants)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the fingerprint for a URL and its variant map.
    pub fn derive(url: &str, variants: &VariantMap) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        for (axis, value) in variants {
            hasher.update(b"\n");
            hasher.update(axis.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        let digest = hasher.finalize();
        let mut hex = hex::encode(digest);
        hex.truncate(KEY_HEX_LEN);
        CacheKey(hex)
    }

    /// Wraps an already-derived key string, e.g. one carried in job params.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        CacheKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
