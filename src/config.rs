//! Cache configuration.
//!
//! [`CacheConfig`] is the single entry point for constructing a cache:
//! the builder assembles one, validates it, and hands it to
//! [`Cache::from_config`](crate::Cache::from_config). A constructed cache
//! keeps its config around and exposes it through
//! [`Cache::config`](crate::Cache::config), so callers can inspect the
//! effective settings after profile defaults were applied.
//!
//! Validation happens once, in the builder; a config that reaches the
//! cache is internally consistent and never fails at runtime.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::ConfigurationError;
use crate::events::EventListener;
use crate::policy::EvictionStrategy;
use crate::sketch::SketchVariant;

/// Computes an entry's weight at insertion time. Weights are computed once
/// and never recomputed.
pub type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u64 + Send + Sync>;

/// Synchronous load-through function: `None` means the key has no value.
pub type SyncLoader<K, V> = Arc<dyn Fn(&K) -> Option<V> + Send + Sync>;

/// Asynchronous load-through function.
pub type AsyncLoader<K, V> = Arc<dyn Fn(&K) -> BoxFuture<'static, Option<V>> + Send + Sync>;

/// The full set of knobs recognized by the cache.
///
/// Prefer building one through [`CacheBuilder`](crate::CacheBuilder) rather
/// than by hand; the builder applies profile defaults and validates.
pub struct CacheConfig<K, V> {
    /// Maximum number of entries, if bounded by count.
    pub max_entries: Option<u64>,
    /// Maximum aggregate weight, if bounded by weight. Requires `weigher`.
    pub max_weight: Option<u64>,
    /// Evict entries this long after creation.
    pub expire_after_write: Option<Duration>,
    /// Evict entries idle for this long.
    pub expire_after_access: Option<Duration>,
    /// Reload entries this long after creation, without evicting them.
    pub refresh_after_write: Option<Duration>,
    /// Weight function, consulted once per insertion.
    pub weigher: Option<Weigher<K, V>>,
    /// Synchronous loader for read-through misses.
    pub loader: Option<SyncLoader<K, V>>,
    /// Asynchronous loader for read-through misses via `get_async`.
    pub async_loader: Option<AsyncLoader<K, V>>,
    /// Eviction strategy.
    pub strategy: EvictionStrategy,
    /// Frequency-sketch variant backing TinyLFU admission.
    pub sketch: SketchVariant,
    /// Whether to maintain hit/miss/load statistics.
    pub record_stats: bool,
    /// Initial capacity hint for the entry store.
    pub initial_capacity: usize,
    /// Concurrency hint; controls store shard and buffer stripe counts.
    pub concurrency: usize,
    /// Registered event listeners.
    pub listeners: Vec<Arc<dyn EventListener<K, V>>>,
    /// How often the maintenance worker wakes.
    pub maintenance_interval: Duration,
}

impl<K, V> Default for CacheConfig<K, V> {
    fn default() -> Self {
        CacheConfig {
            max_entries: None,
            max_weight: None,
            expire_after_write: None,
            expire_after_access: None,
            refresh_after_write: None,
            weigher: None,
            loader: None,
            async_loader: None,
            strategy: EvictionStrategy::default(),
            sketch: SketchVariant::default(),
            record_stats: false,
            initial_capacity: 16,
            concurrency: 16,
            listeners: Vec::new(),
            maintenance_interval: Duration::from_secs(1),
        }
    }
}

impl<K, V> Clone for CacheConfig<K, V> {
    fn clone(&self) -> Self {
        CacheConfig {
            max_entries: self.max_entries,
            max_weight: self.max_weight,
            expire_after_write: self.expire_after_write,
            expire_after_access: self.expire_after_access,
            refresh_after_write: self.refresh_after_write,
            weigher: self.weigher.clone(),
            loader: self.loader.clone(),
            async_loader: self.async_loader.clone(),
            strategy: self.strategy,
            sketch: self.sketch,
            record_stats: self.record_stats,
            initial_capacity: self.initial_capacity,
            concurrency: self.concurrency,
            listeners: self.listeners.clone(),
            maintenance_interval: self.maintenance_interval,
        }
    }
}

impl<K, V> CacheConfig<K, V> {
    /// Checks the mutual exclusions and range constraints.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(max) = self.max_entries {
            if max == 0 {
                return Err(ConfigurationError::InvalidMaximumSize(0));
            }
        }
        if let Some(max) = self.max_weight {
            if max == 0 {
                return Err(ConfigurationError::InvalidMaximumWeight(0));
            }
        }
        if self.max_entries.is_some() && self.max_weight.is_some() {
            return Err(ConfigurationError::ConflictingSettings(
                "maximum_size",
                "maximum_weight",
            ));
        }
        if self.max_weight.is_some() && self.weigher.is_none() {
            return Err(ConfigurationError::MissingWeigher);
        }
        if self.loader.is_some() && self.async_loader.is_some() {
            return Err(ConfigurationError::ConflictingSettings(
                "loader",
                "async_loader",
            ));
        }
        for (duration, name) in [
            (self.expire_after_write, "expire_after_write"),
            (self.expire_after_access, "expire_after_access"),
            (self.refresh_after_write, "refresh_after_write"),
        ] {
            if duration == Some(Duration::ZERO) {
                return Err(ConfigurationError::InvalidExpiration(name));
            }
        }
        Ok(())
    }

    /// The bound used for policy sizing: the entry bound, the weight bound,
    /// or a nominal default when unbounded.
    pub(crate) fn policy_capacity(&self) -> u64 {
        self.max_entries.or(self.max_weight).unwrap_or(10_000)
    }
}

impl<K, V> fmt::Debug for CacheConfig<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("max_entries", &self.max_entries)
            .field("max_weight", &self.max_weight)
            .field("expire_after_write", &self.expire_after_write)
            .field("expire_after_access", &self.expire_after_access)
            .field("refresh_after_write", &self.refresh_after_write)
            .field("weigher", &self.weigher.as_ref().map(|_| "<fn>"))
            .field("loader", &self.loader.as_ref().map(|_| "<fn>"))
            .field("async_loader", &self.async_loader.as_ref().map(|_| "<fn>"))
            .field("strategy", &self.strategy)
            .field("sketch", &self.sketch)
            .field("record_stats", &self.record_stats)
            .field("initial_capacity", &self.initial_capacity)
            .field("concurrency", &self.concurrency)
            .field("listeners", &self.listeners.len())
            .field("maintenance_interval", &self.maintenance_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Config = CacheConfig<String, i32>;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let mut config = Config::default();
        config.max_entries = Some(0);
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::InvalidMaximumSize(0))
        );

        let mut config = Config::default();
        config.max_weight = Some(0);
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::InvalidMaximumWeight(0))
        );
    }

    #[test]
    fn size_and_weight_bounds_conflict() {
        let mut config = Config::default();
        config.max_entries = Some(10);
        config.max_weight = Some(100);
        config.weigher = Some(Arc::new(|_, _| 1));
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ConflictingSettings(
                "maximum_size",
                "maximum_weight"
            ))
        );
    }

    #[test]
    fn weight_bound_requires_weigher() {
        let mut config = Config::default();
        config.max_weight = Some(100);
        assert_eq!(config.validate(), Err(ConfigurationError::MissingWeigher));

        config.weigher = Some(Arc::new(|_, v| *v as u64));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sync_and_async_loaders_conflict() {
        let mut config = Config::default();
        config.loader = Some(Arc::new(|_| None));
        config.async_loader = Some(Arc::new(|_| Box::pin(async { None })));
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ConflictingSettings(
                "loader",
                "async_loader"
            ))
        );
    }

    #[test]
    fn zero_durations_are_rejected() {
        for field in 0..3 {
            let mut config = Config::default();
            match field {
                0 => config.expire_after_write = Some(Duration::ZERO),
                1 => config.expire_after_access = Some(Duration::ZERO),
                _ => config.refresh_after_write = Some(Duration::ZERO),
            }
            assert!(matches!(
                config.validate(),
                Err(ConfigurationError::InvalidExpiration(_))
            ));
        }
    }

    #[test]
    fn policy_capacity_prefers_entry_bound() {
        let mut config = Config::default();
        assert_eq!(config.policy_capacity(), 10_000);
        config.max_entries = Some(42);
        assert_eq!(config.policy_capacity(), 42);
    }
}
