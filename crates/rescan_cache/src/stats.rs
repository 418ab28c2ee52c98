//! Hit/miss/invalidation counters persisted alongside the index.

use serde::{Deserialize, Serialize};

/// Running counters for one cache.
///
/// Owned by the [`Cache`](crate::Cache) and saved inside the index file, so the
/// totals accumulate across tool invocations until an explicit full clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Lookups answered from the cache.
    #[serde(default)]
    pub hits: u64,
    /// Lookups that found nothing usable.
    #[serde(default)]
    pub misses: u64,
    /// Successful writes.
    #[serde(default)]
    pub writes: u64,
    /// Entries removed by invalidation, clearing or eviction.
    #[serde(default)]
    pub invalidations: u64,
}

impl Statistics {
    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_write(&mut self) {
        self.writes += 1;
    }

    pub(crate) fn record_invalidations(&mut self, count: usize) {
        self.invalidations += count as u64;
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Percentage of lookups that were hits, or `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }

    /// A read-only copy tagged with the index format version.
    pub fn snapshot(&self, version: u32) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits,
            misses: self.misses,
            writes: self.writes,
            invalidations: self.invalidations,
            hit_rate: self.hit_rate(),
            version,
        }
    }
}

/// Point-in-time view of [`Statistics`] for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Successful writes.
    pub writes: u64,
    /// Entries removed by invalidation, clearing or eviction.
    pub invalidations: u64,
    /// `hits / (hits + misses)` as a percentage.
    pub hit_rate: f64,
    /// Format version of the cache that produced these numbers.
    pub version: u32,
}
