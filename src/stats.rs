//! Cache statistics.
//!
//! Six lock-free counters cover the events callers usually alert on: hits,
//! misses, evictions, load successes, load failures and cumulative load
//! time. A seventh counter records access-buffer drops, which is the only
//! signal that the buffered bookkeeping is shedding load.
//!
//! Recording is gated by the `record_stats` builder flag. When the flag is
//! off every `record_*` call returns immediately and a snapshot reads all
//! zeros, so an unstatted cache pays nothing on the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counter set owned by the cache.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    total_load_nanos: AtomicU64,
    buffer_drops: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn new(enabled: bool) -> Self {
        StatsCounter {
            enabled,
            ..Default::default()
        }
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        if self.enabled {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        if self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_eviction(&self) {
        if self.enabled {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_load_success(&self, nanos: u64) {
        if self.enabled {
            self.load_successes.fetch_add(1, Ordering::Relaxed);
            self.total_load_nanos.fetch_add(nanos, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_load_failure(&self) {
        if self.enabled {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_buffer_drop(&self) {
        if self.enabled {
            self.buffer_drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copies the counters into a value snapshot. The reads are individual
    /// atomic loads, not a linearization point; in-flight operations may
    /// straddle the copy.
    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            load_successes: self.load_successes.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            total_load_nanos: self.total_load_nanos.load(Ordering::Relaxed),
            buffer_drops: self.buffer_drops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics snapshot returned by
/// [`Cache::stats`](crate::Cache::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (absent or expired).
    pub misses: u64,
    /// Entries removed by the policy or the expiration sweep.
    pub evictions: u64,
    /// Load-through invocations that produced a value.
    pub load_successes: u64,
    /// Load-through invocations that panicked.
    pub load_failures: u64,
    /// Total wall time spent inside loaders, in nanoseconds.
    pub total_load_nanos: u64,
    /// Access records dropped by the buffer under contention or overflow.
    pub buffer_drops: u64,
}

impl CacheStats {
    /// Total number of lookups observed.
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups served from the cache, `0.0` when idle.
    pub fn hit_rate(&self) -> f64 {
        let requests = self.requests();
        if requests == 0 {
            0.0
        } else {
            self.hits as f64 / requests as f64
        }
    }

    /// Fraction of lookups that missed, `0.0` when idle.
    pub fn miss_rate(&self) -> f64 {
        let requests = self.requests();
        if requests == 0 {
            0.0
        } else {
            self.misses as f64 / requests as f64
        }
    }

    /// Mean nanoseconds spent per successful load, `0.0` when no loads ran.
    pub fn average_load_penalty(&self) -> f64 {
        if self.load_successes == 0 {
            0.0
        } else {
            self.total_load_nanos as f64 / self.load_successes as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counter = StatsCounter::new(true);
        counter.record_hit();
        counter.record_hit();
        counter.record_miss();
        counter.record_eviction();
        counter.record_load_success(500);
        counter.record_load_success(1_500);
        counter.record_load_failure();
        counter.record_buffer_drop();

        let stats = counter.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.load_successes, 2);
        assert_eq!(stats.load_failures, 1);
        assert_eq!(stats.total_load_nanos, 2_000);
        assert_eq!(stats.buffer_drops, 1);
    }

    #[test]
    fn disabled_counters_stay_zero() {
        let counter = StatsCounter::new(false);
        counter.record_hit();
        counter.record_miss();
        counter.record_load_success(1_000);
        assert_eq!(counter.snapshot(), CacheStats::default());
    }

    #[test]
    fn hit_rate_is_exact() {
        let counter = StatsCounter::new(true);
        for _ in 0..3 {
            counter.record_hit();
        }
        counter.record_miss();
        let stats = counter.snapshot();
        assert_eq!(stats.requests(), 4);
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert!((stats.miss_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn rates_are_zero_when_idle() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 0.0);
        assert_eq!(stats.average_load_penalty(), 0.0);
    }

    #[test]
    fn load_penalty_averages_over_successes() {
        let counter = StatsCounter::new(true);
        counter.record_load_success(100);
        counter.record_load_success(300);
        let stats = counter.snapshot();
        assert!((stats.average_load_penalty() - 200.0).abs() < f64::EPSILON);
    }
}
