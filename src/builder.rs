//! Cache builder.
//!
//! The builder is the only way to construct a [`Cache`]: it collects
//! settings fluently, fills the gaps from an optional workload profile,
//! validates the result and hands the finished [`CacheConfig`] to the
//! cache. Profile defaults apply strictly to settings the caller did not
//! touch; an explicit value always wins.
//!
//! ```
//! use windcache::{Cache, Profile};
//!
//! let cache: Cache<String, String> = Cache::builder()
//!     .profile(Profile::ApiCache)
//!     .maximum_size(1_000)
//!     .record_stats()
//!     .build()
//!     .expect("valid configuration");
//! ```

use core::fmt;
use core::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::error::ConfigurationError;
use crate::events::EventListener;
use crate::policy::EvictionStrategy;
use crate::profile::{Profile, ProfileSettings};
use crate::sketch::SketchVariant;

/// Fluent builder for [`Cache`].
pub struct CacheBuilder<K, V> {
    preset: Option<ProfileSettings>,
    config: CacheConfig<K, V>,
    // Explicit-set markers for the fields a profile may also supply.
    set_strategy: bool,
    set_sketch: bool,
    set_initial_capacity: bool,
    set_concurrency: bool,
    set_bound: bool,
    set_expire_after_write: bool,
    set_expire_after_access: bool,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        CacheBuilder {
            preset: None,
            config: CacheConfig::default(),
            set_strategy: false,
            set_sketch: false,
            set_initial_capacity: false,
            set_concurrency: false,
            set_bound: false,
            set_expire_after_write: false,
            set_expire_after_access: false,
        }
    }
}

impl<K, V> CacheBuilder<K, V> {
    /// Creates a builder with library defaults.
    pub fn new() -> Self {
        CacheBuilder::default()
    }

    /// Applies a built-in workload profile to all settings not set
    /// explicitly.
    pub fn profile(mut self, profile: Profile) -> Self {
        self.preset = Some(profile.settings());
        self
    }

    /// Applies a custom preset, typically one looked up from a
    /// [`ProfileRegistry`](crate::ProfileRegistry).
    pub fn preset(mut self, settings: ProfileSettings) -> Self {
        self.preset = Some(settings);
        self
    }

    /// Bounds the cache at `max` entries.
    pub fn maximum_size(mut self, max: u64) -> Self {
        self.config.max_entries = Some(max);
        self.set_bound = true;
        self
    }

    /// Bounds the cache at `max` aggregate weight. Requires a
    /// [`weigher`](Self::weigher).
    pub fn maximum_weight(mut self, max: u64) -> Self {
        self.config.max_weight = Some(max);
        self.set_bound = true;
        self
    }

    /// Evicts entries `ttl` after they were written.
    pub fn expire_after_write(mut self, ttl: Duration) -> Self {
        self.config.expire_after_write = Some(ttl);
        self.set_expire_after_write = true;
        self
    }

    /// Evicts entries idle for `tti`.
    pub fn expire_after_access(mut self, tti: Duration) -> Self {
        self.config.expire_after_access = Some(tti);
        self.set_expire_after_access = true;
        self
    }

    /// Reloads entries `age` after they were written, keeping the old
    /// value until the reload lands.
    pub fn refresh_after_write(mut self, age: Duration) -> Self {
        self.config.refresh_after_write = Some(age);
        self
    }

    /// Sets the weight function, consulted once per insertion.
    pub fn weigher(mut self, f: impl Fn(&K, &V) -> u64 + Send + Sync + 'static) -> Self {
        self.config.weigher = Some(Arc::new(f));
        self
    }

    /// Sets the synchronous read-through loader.
    pub fn loader(mut self, f: impl Fn(&K) -> Option<V> + Send + Sync + 'static) -> Self {
        self.config.loader = Some(Arc::new(f));
        self
    }

    /// Sets the asynchronous read-through loader used by `get_async`.
    pub fn async_loader(
        mut self,
        f: impl Fn(&K) -> BoxFuture<'static, Option<V>> + Send + Sync + 'static,
    ) -> Self {
        self.config.async_loader = Some(Arc::new(f));
        self
    }

    /// Selects the eviction strategy.
    pub fn eviction_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.config.strategy = strategy;
        self.set_strategy = true;
        self
    }

    /// Selects the frequency-sketch variant.
    ///
    /// The sketch only backs TinyLFU admission. Combining
    /// [`SketchVariant::None`] with the TinyLFU strategy is allowed: with
    /// no popularity history every window candidate is admitted, which
    /// degrades the policy to a windowed segmented LRU.
    pub fn sketch_variant(mut self, variant: SketchVariant) -> Self {
        self.config.sketch = variant;
        self.set_sketch = true;
        self
    }

    /// Enables hit/miss/load statistics.
    pub fn record_stats(mut self) -> Self {
        self.config.record_stats = true;
        self
    }

    /// Hints the initial entry-store capacity.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self.set_initial_capacity = true;
        self
    }

    /// Hints the expected concurrency (store shards and buffer stripes).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self.set_concurrency = true;
        self
    }

    /// Registers an event listener. May be called repeatedly.
    pub fn listener(mut self, listener: Arc<dyn EventListener<K, V>>) -> Self {
        self.config.listeners.push(listener);
        self
    }

    /// Overrides the maintenance tick interval (default one second).
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    fn apply_preset(&mut self) {
        let Some(preset) = self.preset else {
            return;
        };
        if !self.set_strategy {
            self.config.strategy = preset.strategy;
        }
        if !self.set_sketch {
            self.config.sketch = preset.sketch;
        }
        if !self.set_initial_capacity {
            self.config.initial_capacity = preset.initial_capacity;
        }
        if !self.set_concurrency {
            self.config.concurrency = preset.concurrency;
        }
        // A profile's recommended bound only applies when the caller set no
        // bound at all; a profile must never introduce a second bound.
        if !self.set_bound {
            self.config.max_entries = preset.max_entries;
        }
        if !self.set_expire_after_write {
            self.config.expire_after_write = preset.expire_after_write;
        }
        if !self.set_expire_after_access {
            self.config.expire_after_access = preset.expire_after_access;
        }
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Validates the assembled configuration and constructs the cache.
    pub fn build(mut self) -> Result<Cache<K, V>, ConfigurationError> {
        self.apply_preset();
        self.config.validate()?;
        Ok(Cache::from_config(self.config))
    }
}

impl<K, V> fmt::Debug for CacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("preset", &self.preset)
            .field("config", &self.config)
            .finish()
    }
}
