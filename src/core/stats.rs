// src/core/stats.rs

//! Request and cache counters.
//!
//! Counters are plain atomics; when statistics are disabled in the
//! configuration every recorder method is a no-op and snapshots read all
//! zero. Exactly one of hit / miss / stale-serve is recorded per
//! cacheable request, plus at most one generation event.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub stale_serves: u64,
    pub bypasses: u64,
    pub generations: u64,
    pub generation_failures: u64,
    pub purged_entries: u64,
}

/// Process-wide stats recorder.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    bypasses: AtomicU64,
    generations: AtomicU64,
    generation_failures: AtomicU64,
    purged_entries: AtomicU64,
}

impl StatsRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_hit(&self) {
        self.bump(&self.hits);
    }

    pub fn record_miss(&self) {
        self.bump(&self.misses);
    }

    pub fn record_stale_serve(&self) {
        self.bump(&self.stale_serves);
    }

    pub fn record_bypass(&self) {
        self.bump(&self.bypasses);
    }

    pub fn record_generation(&self) {
        self.bump(&self.generations);
    }

    pub fn record_generation_failure(&self) {
        self.bump(&self.generation_failures);
    }

    pub fn record_purged(&self, count: usize) {
        if self.enabled {
            self.purged_entries
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            purged_entries: self.purged_entries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_when_enabled() {
        let stats = StatsRecorder::new(true);
        stats.record_hit();
        stats.record_hit();
        stats.record_stale_serve();
        stats.record_purged(3);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.stale_serves, 1);
        assert_eq!(snapshot.purged_entries, 3);
        assert_eq!(snapshot.cache_misses, 0);
    }

    #[test]
    fn disabled_recorder_is_a_no_op() {
        let stats = StatsRecorder::new(false);
        stats.record_hit();
        stats.record_miss();
        stats.record_generation();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
