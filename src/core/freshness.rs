// src/core/freshness.rs

//! Pure freshness classification for cache entries.
//!
//! An entry's age partitions it into fresh, stale, or expired. The stale
//! window `W` follows the TTL: content older than `ttl` but younger than
//! `ttl + W` is served stale while a rebuild is scheduled; anything older
//! is treated as absent. When no window is configured, `W = ttl`.

use serde::Serialize;

/// The three freshness states, ordered by increasing age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FreshnessState {
    Fresh,
    Stale,
    Expired,
}

/// The result of classifying one entry at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub state: FreshnessState,
    /// `now - created_at`. Negative under clock skew.
    pub age_seconds: i64,
    /// `ttl + W - age`. Negative once the entry has expired;
    /// `i64::MAX` for never-expiring entries.
    pub expires_in_seconds: i64,
}

impl Verdict {
    pub fn is_fresh(&self) -> bool {
        self.state == FreshnessState::Fresh
    }

    pub fn is_stale(&self) -> bool {
        self.state == FreshnessState::Stale
    }

    pub fn is_expired(&self) -> bool {
        self.state == FreshnessState::Expired
    }
}

/// Classifies an entry written at `created_at` with the given `ttl`,
/// as observed at `now` (both in epoch seconds).
///
/// `ttl = 0` is the never-expire sentinel: such entries are always fresh
/// regardless of age or window. A future `created_at` (clock skew) is
/// fresh with `expires_in >= ttl`. The boundaries are exact: `age == ttl`
/// is stale, `age == ttl + W` is expired.
pub fn classify(created_at: u64, ttl: u64, stale_window: Option<u64>, now: u64) -> Verdict {
    let age = now as i64 - created_at as i64;

    if ttl == 0 {
        return Verdict {
            state: FreshnessState::Fresh,
            age_seconds: age,
            expires_in_seconds: i64::MAX,
        };
    }

    let window = stale_window.unwrap_or(ttl);
    let ttl = ttl as i64;
    let horizon = ttl.saturating_add(window as i64);
    let expires_in = horizon.saturating_sub(age);

    let state = if age < ttl {
        FreshnessState::Fresh
    } else if age < horizon {
        FreshnessState::Stale
    } else {
        FreshnessState::Expired
    };

    Verdict {
        state,
        age_seconds: age,
        expires_in_seconds: expires_in,
    }
}
