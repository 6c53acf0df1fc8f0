//! The cache facade.
//!
//! [`Cache`] wires the subsystems together: the sharded entry store holds
//! the data, the eviction policy tracks popularity behind a striped access
//! buffer, the frequency sketch feeds TinyLFU admission, the statistics
//! counters observe everything, and a background worker sweeps expired
//! entries and fans out refreshes.
//!
//! # Hot-path discipline
//!
//! `get` touches exactly one shard read lock plus a handful of atomics. The
//! policy is never consulted on the hot path: accesses are recorded into
//! the striped buffer and applied in batches by whichever thread trips the
//! drain threshold, takes an eviction, or runs the maintenance tick. Drains
//! are serialized by the policy mutex and surfaced through the cache's
//! `Active`/`Maintenance`/`Shutdown` state machine.
//!
//! Lock ordering is fixed: the policy mutex, when held, is acquired before
//! any store shard lock, and listeners are always invoked with no lock
//! held, so a listener may call back into the cache.
//!
//! # Example
//!
//! ```
//! use windcache::Cache;
//!
//! let cache: Cache<String, String> = Cache::builder()
//!     .maximum_size(1_000)
//!     .record_stats()
//!     .build()
//!     .unwrap();
//!
//! cache.put("user:42".into(), "Alice".into());
//! assert_eq!(cache.get(&"user:42".into()), Some("Alice".into()));
//! assert_eq!(cache.stats().hits, 1);
//! cache.shutdown();
//! ```

use core::borrow::Borrow;
use core::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;

use crate::buffer::{AccessBuffer, DRAIN_THRESHOLD};
use crate::builder::CacheBuilder;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::LoadError;
use crate::events::{EvictionReason, ListenerSet};
use crate::policy::{build_policy, Access, AccessKind, EvictionPolicy, EvictionStrategy};
use crate::scheduler::MaintenanceWorker;
use crate::sketch::FrequencySketch;
use crate::stats::{CacheStats, StatsCounter};
use crate::store::EntryStore;

/// Lifecycle states of the cache.
const STATE_ACTIVE: u8 = 0;
const STATE_MAINTENANCE: u8 = 1;
const STATE_SHUTDOWN: u8 = 2;

/// Outcome of a store lookup before any loader is consulted.
enum Lookup<V> {
    Hit(V),
    Absent,
}

/// A concurrent, bounded, in-process key-value cache.
///
/// Construct one through [`Cache::builder`]. The cache is shared across
/// threads behind an [`Arc`]; all operations take `&self`.
pub struct Cache<K, V> {
    inner: Arc<CacheInner<K, V>>,
    worker: Mutex<Option<MaintenanceWorker>>,
}

struct CacheInner<K, V> {
    config: CacheConfig<K, V>,
    store: EntryStore<K, V>,
    /// Policy state: single-writer, mutated only under this mutex by the
    /// drainer, the eviction loop and the sweep.
    policy: Mutex<Box<dyn EvictionPolicy<K>>>,
    buffer: AccessBuffer<K>,
    stats: StatsCounter,
    listeners: ListenerSet<K, V>,
    clock: Clock,
    state: AtomicU8,
    /// Striped locks coalescing concurrent load-throughs per key.
    load_locks: Box<[Mutex<()>]>,
    load_mask: u64,
    /// Precomputed expire-after-access window, in nanoseconds.
    tti_nanos: Option<u64>,
    /// Precomputed refresh-after-write age, in nanoseconds.
    refresh_nanos: Option<u64>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Returns a builder with library defaults.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    /// Constructs a cache from a validated configuration.
    ///
    /// Prefer [`Cache::builder`]; this entry point exists for callers that
    /// assemble a [`CacheConfig`] themselves and have already validated it.
    pub fn from_config(config: CacheConfig<K, V>) -> Self {
        Self::with_clock(config, Clock::system())
    }

    pub(crate) fn with_clock(config: CacheConfig<K, V>, clock: Clock) -> Self {
        let capacity = config.policy_capacity();
        let sketch = match config.strategy {
            EvictionStrategy::TinyLfu => {
                FrequencySketch::build(config.sketch, capacity).map(Arc::new)
            }
            _ => None,
        };
        let policy = build_policy(config.strategy, capacity, sketch);

        let shards = config.concurrency.max(1).next_power_of_two();
        let load_locks = (0..shards)
            .map(|_| Mutex::new(()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let tti_nanos = config
            .expire_after_access
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        let refresh_nanos = config
            .refresh_after_write
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));

        let inner = Arc::new(CacheInner {
            store: EntryStore::new(shards, config.initial_capacity),
            policy: Mutex::new(policy),
            buffer: AccessBuffer::new(shards),
            stats: StatsCounter::new(config.record_stats),
            listeners: ListenerSet::new(config.listeners.clone()),
            clock,
            state: AtomicU8::new(STATE_ACTIVE),
            load_mask: shards as u64 - 1,
            load_locks,
            tti_nanos,
            refresh_nanos,
            config,
        });

        let weak = Arc::downgrade(&inner);
        let worker = MaintenanceWorker::spawn(inner.config.maintenance_interval, move || {
            match weak.upgrade() {
                Some(inner) => {
                    inner.run_maintenance();
                    true
                }
                None => false,
            }
        });

        Cache {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Looks up a value, loading it through the configured sync loader on a
    /// miss.
    ///
    /// Returns `None` for absent or expired keys when no loader is
    /// configured, when the loader returns nothing, or when the loader
    /// fails. An expired entry is removed on sight and counted as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        if self.inner.is_shutdown() {
            return None;
        }
        match self.inner.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Absent => {
                self.inner.stats.record_miss();
                if self.inner.config.loader.is_some() {
                    self.inner.load_through(key)
                } else {
                    None
                }
            }
        }
    }

    /// Looks up a value without ever invoking a loader.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        if self.inner.is_shutdown() {
            return None;
        }
        match self.inner.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Absent => {
                self.inner.stats.record_miss();
                None
            }
        }
    }

    /// Returns the cached value or inserts the one produced by `init`.
    ///
    /// The computation is counted as a load; concurrent callers for the
    /// same key are coalesced so `init` runs at most once per miss.
    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce(&K) -> V) -> Option<V> {
        if self.inner.is_shutdown() {
            return None;
        }
        if let Lookup::Hit(value) = self.inner.lookup(&key) {
            return Some(value);
        }
        self.inner.stats.record_miss();

        let hash = self.inner.store.hash(&key);
        let _guard = self.inner.load_lock(hash);
        // Another coalesced caller may have inserted while we waited.
        if let Some(value) = self.inner.peek_live(&key, hash) {
            return Some(value);
        }

        let started = self.inner.clock.now();
        let value = init(&key);
        let elapsed = self.inner.clock.now().saturating_sub(started);
        self.inner.stats.record_load_success(elapsed);
        self.inner.insert_value(key, value.clone(), None, true);
        Some(value)
    }

    /// Inserts or replaces a value.
    ///
    /// The displaced value (if any) is reported through `on_remove`, the
    /// new one through `on_put`. Exceeding a configured bound evicts
    /// immediately.
    pub fn put(&self, key: K, value: V) {
        if self.inner.is_shutdown() {
            return;
        }
        self.inner.insert_value(key, value, None, false);
    }

    /// Inserts or replaces a value with an explicit weight, bypassing the
    /// configured weigher.
    pub fn put_with_weight(&self, key: K, value: V, weight: u64) {
        if self.inner.is_shutdown() {
            return;
        }
        self.inner.insert_value(key, value, Some(weight), false);
    }

    /// Removes a key, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.inner.is_shutdown() {
            return None;
        }
        let hash = self.inner.store.hash(key);
        let (key, entry) = self.inner.store.remove(hash, key)?;
        self.inner.push_access(key.clone(), hash, AccessKind::Evict);
        self.inner.listeners.remove(&key, entry.value());
        Some(entry.into_value())
    }

    /// Drops every entry and resets the policy.
    pub fn clear(&self) {
        if self.inner.is_shutdown() {
            return;
        }
        {
            let mut policy = self.inner.policy.lock();
            self.inner.buffer.drain(|_| {});
            policy.clear();
        }
        self.inner.store.clear();
        self.inner.listeners.clear();
    }

    /// Number of live entries, including any whose expiration has not yet
    /// been observed.
    pub fn len(&self) -> u64 {
        self.inner.store.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of live entry weights.
    pub fn total_weight(&self) -> u64 {
        self.inner.store.total_weight()
    }

    /// Whether a live (non-expired) entry exists for the key.
    ///
    /// Not a cache read: no statistics are recorded and no recency is
    /// updated.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.inner.is_shutdown() {
            return false;
        }
        let hash = self.inner.store.hash(key);
        let now = self.inner.clock.now();
        let tti = self.inner.tti_nanos;
        self.inner
            .store
            .with_entry(hash, key, |entry| !entry.is_expired(now, tti))
            .unwrap_or(false)
    }

    /// Weakly consistent snapshot of the live keys.
    pub fn keys(&self) -> Vec<K> {
        self.snapshot_entries().into_iter().map(|(k, _)| k).collect()
    }

    /// Weakly consistent snapshot of the live values.
    pub fn values(&self) -> Vec<V> {
        self.snapshot_entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Weakly consistent snapshot of the live key-value pairs.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.snapshot_entries()
    }

    fn snapshot_entries(&self) -> Vec<(K, V)> {
        if self.inner.is_shutdown() {
            return Vec::new();
        }
        let now = self.inner.clock.now();
        let tti = self.inner.tti_nanos;
        let mut out = Vec::new();
        self.inner.store.scan(|key, entry| {
            if !entry.is_expired(now, tti) {
                out.push((key.clone(), entry.value().clone()));
            }
        });
        out
    }

    /// Current statistics snapshot. All zeros unless `record_stats` was
    /// enabled at build time.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// The effective configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig<K, V> {
        &self.inner.config
    }

    /// Asynchronous [`get`](Self::get): on a miss, awaits the configured
    /// async loader (falling back to the sync loader if that is what was
    /// configured).
    pub async fn get_async(&self, key: &K) -> Option<V> {
        if self.inner.is_shutdown() {
            return None;
        }
        match self.inner.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Absent => {
                self.inner.stats.record_miss();
                let Some(loader) = self.inner.config.async_loader.clone() else {
                    return if self.inner.config.loader.is_some() {
                        self.inner.load_through(key)
                    } else {
                        None
                    };
                };

                let started = self.inner.clock.now();
                let outcome = AssertUnwindSafe(loader(key)).catch_unwind().await;
                let elapsed = self.inner.clock.now().saturating_sub(started);
                match outcome {
                    Ok(Some(value)) => {
                        self.inner.stats.record_load_success(elapsed);
                        self.inner.insert_value(key.clone(), value.clone(), None, true);
                        Some(value)
                    }
                    Ok(None) => None,
                    Err(payload) => {
                        let error = LoadError::from_panic(payload);
                        self.inner.stats.record_load_failure();
                        tracing::warn!(error = %error, "async loader failed");
                        self.inner.listeners.load_error(key, &error);
                        None
                    }
                }
            }
        }
    }

    /// Asynchronous [`put`](Self::put).
    pub async fn put_async(&self, key: K, value: V) {
        self.put(key, value);
    }

    /// Asynchronous [`remove`](Self::remove).
    pub async fn remove_async<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove(key)
    }

    /// Asynchronous [`clear`](Self::clear).
    pub async fn clear_async(&self) {
        self.clear();
    }

    /// Terminally shuts the cache down.
    ///
    /// Rejects new operations, drains outstanding access records once,
    /// stops the maintenance worker with a bounded grace period, and drops
    /// every entry. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.begin_shutdown() {
            if let Some(mut worker) = self.worker.lock().take() {
                worker.stop();
            }
            let mut policy = self.inner.policy.lock();
            self.inner.buffer.drain(|access| policy.record(access));
            policy.clear();
        }
        // Always clear, even on repeated calls: an insert that passed the
        // state gate concurrently with the first shutdown may have landed
        // after its clear.
        self.inner.store.clear();
    }

    /// Runs one maintenance pass inline: drains the access buffer, sweeps
    /// expired entries and fans out refreshes. The background worker calls
    /// this periodically; tests and latency-sensitive callers may invoke it
    /// directly.
    pub fn run_pending_maintenance(&self) {
        self.inner.run_maintenance();
    }
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        if self.inner.begin_shutdown() {
            if let Some(mut worker) = self.worker.lock().take() {
                worker.stop();
            }
        }
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.inner.store.len())
            .field("total_weight", &self.inner.store.total_weight())
            .field("strategy", &self.inner.config.strategy)
            .finish()
    }
}

impl<K, V> CacheInner<K, V> {
    #[inline]
    fn is_shutdown(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_SHUTDOWN
    }

    /// Transitions to `Shutdown`; returns false if already there.
    fn begin_shutdown(&self) -> bool {
        self.state.swap(STATE_SHUTDOWN, Ordering::AcqRel) != STATE_SHUTDOWN
    }

    fn try_begin_maintenance(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_ACTIVE,
                STATE_MAINTENANCE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn end_maintenance(&self) {
        // Shutdown may have won the race; never overwrite it.
        let _ = self.state.compare_exchange(
            STATE_MAINTENANCE,
            STATE_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl<K, V> CacheInner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[inline]
    fn load_lock(&self, hash: u64) -> parking_lot::MutexGuard<'_, ()> {
        self.load_locks[(hash & self.load_mask) as usize].lock()
    }

    #[inline]
    fn push_access(&self, key: K, hash: u64, kind: AccessKind) {
        if !self.buffer.push(Access { key, hash, kind }) {
            self.stats.record_buffer_drop();
        }
    }

    /// Silent lookup: touches a live entry and clones its value without
    /// recording statistics or access history. Used to re-check the store
    /// after winning a coalesced load race.
    fn peek_live(&self, key: &K, hash: u64) -> Option<V> {
        let now = self.clock.now();
        let tti = self.tti_nanos;
        self.store
            .with_entry(hash, key, |entry| {
                if entry.is_expired(now, tti) {
                    None
                } else {
                    entry.touch(now);
                    Some(entry.value().clone())
                }
            })
            .flatten()
    }

    /// Store lookup with expiration handling. On a hit the entry is
    /// touched, the hit is counted and a read is recorded; an expired entry
    /// is removed and reported before the lookup turns into a miss.
    fn lookup(&self, key: &K) -> Lookup<V> {
        let hash = self.store.hash(key);
        let now = self.clock.now();
        let tti = self.tti_nanos;

        let found = self.store.with_entry(hash, key, |entry| {
            if entry.is_expired(now, tti) {
                None
            } else {
                entry.touch(now);
                Some(entry.value().clone())
            }
        });

        match found {
            Some(Some(value)) => {
                self.stats.record_hit();
                self.push_access(key.clone(), hash, AccessKind::Read);
                self.maybe_drain();
                Lookup::Hit(value)
            }
            Some(None) => {
                // Expired on sight: remove unless a fresh entry raced in.
                if let Some((key, entry)) =
                    self.store
                        .remove_if(hash, key, |e| e.is_expired(now, tti))
                {
                    self.stats.record_eviction();
                    self.push_access(key.clone(), hash, AccessKind::Evict);
                    self.listeners.expire(&key, entry.value());
                    self.listeners
                        .evict(&key, entry.value(), EvictionReason::Expired);
                }
                Lookup::Absent
            }
            None => Lookup::Absent,
        }
    }

    /// Inserts a value, firing `on_put` or (for loaded values) `on_load`,
    /// then enforces the configured bounds.
    fn insert_value(&self, key: K, value: V, weight: Option<u64>, loaded: bool) {
        let now = self.clock.now();
        let wall = self.clock.wall_now();
        let weight = weight
            .or_else(|| self.config.weigher.as_ref().map(|w| w(&key, &value)))
            .unwrap_or(1);
        let hash = self.store.hash(&key);

        let entry = CacheEntry::new(
            value.clone(),
            weight,
            now,
            wall,
            self.config.expire_after_write,
        );
        let old = self.store.insert(hash, key.clone(), entry);
        self.push_access(key.clone(), hash, AccessKind::Write);

        if let Some(old) = &old {
            self.listeners.remove(&key, old.value());
        }
        if loaded {
            self.listeners.load(&key, &value);
        } else {
            self.listeners.put(&key, &value);
        }

        self.maybe_drain();
        self.evict_if_needed();
    }

    /// Runs the sync loader for a missed key, coalescing concurrent misses
    /// on the same key through the striped load locks.
    fn load_through(&self, key: &K) -> Option<V> {
        let loader = self.config.loader.clone()?;
        let hash = self.store.hash(key);
        let _guard = self.load_lock(hash);

        // A coalesced caller may find the winner's value already cached.
        if let Some(value) = self.peek_live(key, hash) {
            return Some(value);
        }

        let started = self.clock.now();
        let outcome = catch_unwind(AssertUnwindSafe(|| loader(key)));
        let elapsed = self.clock.now().saturating_sub(started);

        match outcome {
            Ok(Some(value)) => {
                self.stats.record_load_success(elapsed);
                self.insert_value(key.clone(), value.clone(), None, true);
                Some(value)
            }
            Ok(None) => None,
            Err(payload) => {
                let error = LoadError::from_panic(payload);
                self.stats.record_load_failure();
                tracing::warn!(error = %error, "loader failed");
                self.listeners.load_error(key, &error);
                None
            }
        }
    }

    /// Applies buffered access records once the threshold is crossed.
    /// Skipped entirely if another thread is already in maintenance.
    fn maybe_drain(&self) {
        if self.buffer.pending() < DRAIN_THRESHOLD {
            return;
        }
        if !self.try_begin_maintenance() {
            return;
        }
        {
            let mut policy = self.policy.lock();
            self.buffer.drain(|access| policy.record(access));
        }
        self.end_maintenance();
    }

    /// Evicts until the configured bound holds again.
    fn evict_if_needed(&self) {
        loop {
            let over_weight = self
                .config
                .max_weight
                .is_some_and(|max| self.store.total_weight() > max);
            let over_size = self
                .config
                .max_entries
                .is_some_and(|max| self.store.len() > max);
            if !over_weight && !over_size {
                return;
            }

            let victim = {
                let mut policy = self.policy.lock();
                // Apply pending records first so the policy knows every key
                // it may be asked to evict.
                self.buffer.drain(|access| policy.record(access));
                policy.select_victim()
            };
            let Some(victim) = victim else {
                return;
            };

            let hash = self.store.hash(&victim);
            // A concurrently removed victim is a no-op; keep looping.
            if let Some((key, entry)) = self.store.remove(hash, &victim) {
                self.stats.record_eviction();
                let reason = if over_weight {
                    EvictionReason::Weight
                } else {
                    EvictionReason::Size
                };
                self.listeners.evict(&key, entry.value(), reason);
            }
        }
    }

    /// One maintenance pass: drain, sweep, refresh.
    fn run_maintenance(&self) {
        if self.is_shutdown() {
            return;
        }
        if !self.try_begin_maintenance() {
            return;
        }

        {
            let mut policy = self.policy.lock();
            self.buffer.drain(|access| policy.record(access));
        }
        self.sweep_expired();
        self.end_maintenance();

        // Refreshes run outside the maintenance state: loaders may block,
        // and nothing here contends with the hot path.
        self.refresh_stale();
    }

    /// Removes every expired entry and reports it.
    fn sweep_expired(&self) {
        let now = self.clock.now();
        let tti = self.tti_nanos;

        let mut expired = Vec::new();
        self.store.scan(|key, entry| {
            if entry.is_expired(now, tti) {
                expired.push(key.clone());
            }
        });
        if expired.is_empty() {
            return;
        }
        tracing::debug!(count = expired.len(), "sweeping expired entries");

        let mut removed = Vec::new();
        {
            let mut policy = self.policy.lock();
            for key in expired {
                let hash = self.store.hash(&key);
                if let Some((key, entry)) =
                    self.store.remove_if(hash, &key, |e| e.is_expired(now, tti))
                {
                    self.stats.record_eviction();
                    policy.on_remove(&key);
                    removed.push((key, entry));
                }
            }
        }
        for (key, entry) in removed {
            self.listeners.expire(&key, entry.value());
            self.listeners
                .evict(&key, entry.value(), EvictionReason::Expired);
        }
    }

    /// Reloads entries older than the refresh-after-write age through the
    /// sync loader. Failures keep the existing value.
    fn refresh_stale(&self) {
        let Some(refresh) = self.refresh_nanos else {
            return;
        };
        let Some(loader) = self.config.loader.clone() else {
            return;
        };

        let now = self.clock.now();
        let mut stale = Vec::new();
        self.store.scan(|key, entry| {
            if entry.age(now) > refresh {
                stale.push(key.clone());
            }
        });

        for key in stale {
            if self.is_shutdown() {
                return;
            }
            let started = self.clock.now();
            match catch_unwind(AssertUnwindSafe(|| loader(&key))) {
                Ok(Some(value)) => {
                    let elapsed = self.clock.now().saturating_sub(started);
                    self.stats.record_load_success(elapsed);
                    self.insert_value(key, value, None, true);
                }
                Ok(None) => {}
                Err(payload) => {
                    let error = LoadError::from_panic(payload);
                    self.stats.record_load_failure();
                    tracing::warn!(error = %error, "refresh loader failed; keeping stale value");
                    self.listeners.load_error(&key, &error);
                }
            }
        }
    }
}
