//! Cache entry type.
//!
//! A [`CacheEntry`] is created on insertion and has an immutable shape: the
//! value, weight and the creation/expiration timestamps never change after
//! construction. The only mutable state is the pair of atomic fields used on
//! the read path (last-access timestamp and access counter), which lets the
//! facade record an access while holding nothing stronger than the store
//! shard's read lock.
//!
//! All timestamps that participate in expiration decisions are monotonic
//! nanoseconds from the cache's [`Clock`](crate::clock::Clock). The
//! wall-clock creation timestamp is carried purely as a diagnostic.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::clock::NO_EXPIRY;

/// A single cached value with its bookkeeping metadata.
pub(crate) struct CacheEntry<V> {
    /// The cached value.
    value: V,

    /// Weight of this entry. 1 unless a weigher is configured.
    weight: u64,

    /// Monotonic creation timestamp in nanoseconds.
    created_at: u64,

    /// Wall-clock creation timestamp (nanoseconds since the Unix epoch).
    created_wall: u64,

    /// Absolute write-expiration deadline in monotonic nanoseconds, or
    /// [`NO_EXPIRY`] when expire-after-write is not configured.
    expires_at: u64,

    /// Monotonic timestamp of the most recent access.
    last_access: AtomicU64,

    /// Number of times this entry has been read.
    access_count: AtomicU64,
}

impl<V> CacheEntry<V> {
    /// Creates an entry stamped at `now` (monotonic) / `wall` (diagnostic).
    ///
    /// `ttl` is the configured expire-after-write duration; `None` means the
    /// entry never expires by age.
    pub(crate) fn new(value: V, weight: u64, now: u64, wall: u64, ttl: Option<Duration>) -> Self {
        let expires_at = match ttl {
            Some(d) => now.saturating_add(u64::try_from(d.as_nanos()).unwrap_or(NO_EXPIRY)),
            None => NO_EXPIRY,
        };
        CacheEntry {
            value,
            weight,
            created_at: now,
            created_wall: wall,
            expires_at,
            last_access: AtomicU64::new(now),
            access_count: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub(crate) fn into_value(self) -> V {
        self.value
    }

    #[inline]
    pub(crate) fn weight(&self) -> u64 {
        self.weight
    }

    #[inline]
    pub(crate) fn created_at(&self) -> u64 {
        self.created_at
    }

    #[inline]
    pub(crate) fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Records an access at `now`. Called from the read path under the shard
    /// read lock; both fields are atomics so concurrent readers race benignly.
    #[inline]
    pub(crate) fn touch(&self, now: u64) {
        self.last_access.store(now, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Age of the entry at `now`, in nanoseconds.
    #[inline]
    pub(crate) fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Whether the entry is expired at `now`.
    ///
    /// `tti` is the configured expire-after-access window in nanoseconds
    /// (`None` when expire-after-access is not configured). Write expiry is
    /// baked into `expires_at` at construction.
    #[inline]
    pub(crate) fn is_expired(&self, now: u64, tti: Option<u64>) -> bool {
        if now >= self.expires_at {
            return true;
        }
        match tti {
            Some(window) => now.saturating_sub(self.last_access()) > window,
            None => false,
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("weight", &self.weight)
            .field("created_at", &self.created_at)
            .field("created_wall", &self.created_wall)
            .field("expires_at", &self.expires_at)
            .field("last_access", &self.last_access())
            .field("access_count", &self.access_count())
            .finish()
    }
}
