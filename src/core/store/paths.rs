// src/core/store/paths.rs

//! Key-to-path mapping for the on-disk store.
//!
//! Keys are sanitized to a safe filename alphabet. In sharded mode the
//! artifact lands two directory levels deep, keyed by the first four hex
//! characters of a SHA-256 of the raw key, which keeps individual
//! directories small on filesystems that scan them linearly.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Suffix identifying a persisted cache entry.
pub const ENTRY_SUFFIX: &str = ".cache";

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Hex SHA-256 of the raw (unsanitized) key.
pub fn shard_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Computes the artifact path for a key under `root`.
///
/// Sharded: `<root>/<hash[0..2]>/<hash[2..4]>/<safe_key>.cache`;
/// flat: `<root>/<safe_key>.cache`.
pub fn entry_path(root: &Path, key: &str, sharded: bool) -> PathBuf {
    let file_name = format!("{}{ENTRY_SUFFIX}", sanitize_key(key));
    if sharded {
        let hash = shard_hash(key);
        root.join(&hash[0..2]).join(&hash[2..4]).join(file_name)
    } else {
        root.join(file_name)
    }
}

/// Recovers the storage key from an artifact file name, if it is one.
pub fn key_from_file_name(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(ENTRY_SUFFIX)
}
