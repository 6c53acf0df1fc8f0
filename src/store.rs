//! Sharded concurrent entry store.
//!
//! The store is the ownership home of every [`CacheEntry`]: a fixed array
//! of hash-map shards, each behind its own `RwLock`, with keys partitioned
//! by hash. Lookups take only the owning shard's read lock; mutations take
//! its write lock. Operations on different shards never contend, and reads
//! within one shard proceed in parallel.
//!
//! ```text
//!  hash(key) & mask ──▶ shard selection
//!
//!  ┌─────────────┐ ┌─────────────┐     ┌─────────────┐
//!  │   Shard 0   │ │   Shard 1   │ ... │  Shard N-1  │
//!  │  [RwLock]   │ │  [RwLock]   │     │  [RwLock]   │
//!  │  HashMap    │ │  HashMap    │     │  HashMap    │
//!  └─────────────┘ └─────────────┘     └─────────────┘
//! ```
//!
//! Aggregate entry count and weight live in atomics updated alongside each
//! mutation, so bound checks read two counters instead of walking shards.
//! Iteration locks one shard at a time and therefore observes a weakly
//! consistent snapshot: entries inserted or removed mid-scan may or may not
//! appear, but no entry is ever observed twice.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::{DefaultHashBuilder, HashMap};
use parking_lot::RwLock;

use crate::entry::CacheEntry;

/// Key-partitioned map of live cache entries.
pub(crate) struct EntryStore<K, V> {
    shards: Box<[RwLock<HashMap<K, CacheEntry<V>, DefaultHashBuilder>>]>,
    shard_mask: u64,
    hash_builder: DefaultHashBuilder,
    entry_count: AtomicU64,
    total_weight: AtomicU64,
}

impl<K, V> EntryStore<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates a store with `shards` shards (rounded up to a power of two),
    /// sizing each shard's map for `initial_capacity` total entries.
    pub(crate) fn new(shards: usize, initial_capacity: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        let per_shard = (initial_capacity / count).max(4);
        let hash_builder = DefaultHashBuilder::default();
        let shards = (0..count)
            .map(|_| {
                RwLock::new(HashMap::with_capacity_and_hasher(
                    per_shard,
                    hash_builder.clone(),
                ))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        EntryStore {
            shards,
            shard_mask: count as u64 - 1,
            hash_builder,
            entry_count: AtomicU64::new(0),
            total_weight: AtomicU64::new(0),
        }
    }

    /// Hashes a key with the store's hasher. The facade computes this once
    /// per operation and reuses it for shard selection, the access buffer
    /// and the frequency sketch.
    #[inline]
    pub(crate) fn hash<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
    {
        self.hash_builder.hash_one(key)
    }

    #[inline]
    fn shard(&self, hash: u64) -> &RwLock<HashMap<K, CacheEntry<V>, DefaultHashBuilder>> {
        &self.shards[(hash & self.shard_mask) as usize]
    }

    /// Runs `f` against the entry under the shard read lock.
    pub(crate) fn with_entry<Q, R>(
        &self,
        hash: u64,
        key: &Q,
        f: impl FnOnce(&CacheEntry<V>) -> R,
    ) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let shard = self.shard(hash).read();
        shard.get(key).map(f)
    }

    /// Inserts or replaces an entry, returning the displaced one.
    pub(crate) fn insert(&self, hash: u64, key: K, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        let new_weight = entry.weight();
        let old = {
            let mut shard = self.shard(hash).write();
            shard.insert(key, entry)
        };
        self.total_weight.fetch_add(new_weight, Ordering::Relaxed);
        match &old {
            Some(prev) => {
                self.total_weight.fetch_sub(prev.weight(), Ordering::Relaxed);
            }
            None => {
                self.entry_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        old
    }

    /// Removes an entry unconditionally, returning the owned key alongside
    /// it (the policy and the listeners both need the key back).
    pub(crate) fn remove<Q>(&self, hash: u64, key: &Q) -> Option<(K, CacheEntry<V>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let removed = {
            let mut shard = self.shard(hash).write();
            shard.remove_entry(key)
        };
        if let Some((_, entry)) = &removed {
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
            self.total_weight.fetch_sub(entry.weight(), Ordering::Relaxed);
        }
        removed
    }

    /// Removes an entry only if `pred` still holds under the write lock.
    ///
    /// Used for expiration: between the read-path check and the removal the
    /// key may have been replaced with a fresh entry, which must survive.
    pub(crate) fn remove_if<Q>(
        &self,
        hash: u64,
        key: &Q,
        pred: impl FnOnce(&CacheEntry<V>) -> bool,
    ) -> Option<(K, CacheEntry<V>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let removed = {
            let mut shard = self.shard(hash).write();
            match shard.get(key) {
                Some(entry) if pred(entry) => shard.remove_entry(key),
                _ => None,
            }
        };
        if let Some((_, entry)) = &removed {
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
            self.total_weight.fetch_sub(entry.weight(), Ordering::Relaxed);
        }
        removed
    }

    /// Visits every entry under one shard read lock at a time.
    pub(crate) fn scan(&self, mut f: impl FnMut(&K, &CacheEntry<V>)) {
        for shard in self.shards.iter() {
            let guard = shard.read();
            for (key, entry) in guard.iter() {
                f(key, entry);
            }
        }
    }

    /// Drops every entry and resets the aggregates.
    pub(crate) fn clear(&self) {
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            let drained = guard.len() as u64;
            let weight: u64 = guard.values().map(CacheEntry::weight).sum();
            guard.clear();
            self.entry_count.fetch_sub(drained, Ordering::Relaxed);
            self.total_weight.fetch_sub(weight, Ordering::Relaxed);
        }
    }
}

impl<K, V> EntryStore<K, V> {
    /// Number of live entries.
    #[inline]
    pub(crate) fn len(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    /// Sum of live entry weights.
    #[inline]
    pub(crate) fn total_weight(&self) -> u64 {
        self.total_weight.load(Ordering::Relaxed)
    }
}

impl<K, V> std::fmt::Debug for EntryStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .field("total_weight", &self.total_weight())
            .finish()
    }
}
