//! Workload profiles.
//!
//! A profile is a named preset mapping a workload description to an
//! eviction strategy and tuning defaults. Profiles only fill in settings
//! the user has not set explicitly on the builder, so
//! `builder().profile(Profile::ReadHeavy).maximum_size(100)` keeps the
//! explicit bound and takes everything else from the preset.
//!
//! The built-in table is immutable. Custom presets can be registered at
//! runtime, but only through an explicit [`ProfileRegistry`] handle; there
//! is no hidden global registration path.

use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::policy::EvictionStrategy;
use crate::sketch::SketchVariant;

/// Named workload presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Profile {
    /// Balanced defaults for unknown workloads.
    Default,
    /// Mostly lookups over a stable working set.
    ReadHeavy,
    /// High churn; recency matters more than frequency history.
    WriteHeavy,
    /// Small footprint over raw hit rate.
    MemoryEfficient,
    /// Throughput first: wide sharding, large working set.
    HighPerformance,
    /// Session-style data with idle timeout.
    SessionCache,
    /// Upstream API responses with a freshness window.
    ApiCache,
    /// Memoized computation results; recomputation is the cost to avoid.
    ComputeCache,
    /// Feature/embedding lookups for model serving.
    MlOptimized,
    /// Minimal bookkeeping; plain insertion-order eviction.
    ZeroCopy,
    /// Tuned for very wide machines.
    HardwareOptimized,
    /// Short-lived entries fronting a distributed source of truth.
    Distributed,
}

/// The tuning tuple a profile expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSettings {
    /// Eviction strategy to use.
    pub strategy: EvictionStrategy,
    /// Frequency-sketch variant backing admission.
    pub sketch: SketchVariant,
    /// Initial capacity hint for the entry store.
    pub initial_capacity: usize,
    /// Concurrency hint (shard and stripe count).
    pub concurrency: usize,
    /// Recommended default entry bound.
    pub max_entries: Option<u64>,
    /// Recommended expire-after-write duration.
    pub expire_after_write: Option<Duration>,
    /// Recommended expire-after-access duration.
    pub expire_after_access: Option<Duration>,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Profile::Default.settings()
    }
}

impl Profile {
    /// Expands the profile into its settings tuple.
    pub fn settings(self) -> ProfileSettings {
        let base = ProfileSettings {
            strategy: EvictionStrategy::TinyLfu,
            sketch: SketchVariant::Optimized,
            initial_capacity: 16,
            concurrency: 16,
            max_entries: Some(10_000),
            expire_after_write: None,
            expire_after_access: None,
        };
        match self {
            Profile::Default => base,
            Profile::ReadHeavy => ProfileSettings {
                initial_capacity: 256,
                concurrency: 32,
                max_entries: Some(50_000),
                ..base
            },
            Profile::WriteHeavy => ProfileSettings {
                strategy: EvictionStrategy::Lru,
                sketch: SketchVariant::None,
                concurrency: 64,
                max_entries: Some(25_000),
                ..base
            },
            Profile::MemoryEfficient => ProfileSettings {
                strategy: EvictionStrategy::Lfu,
                sketch: SketchVariant::Basic,
                initial_capacity: 64,
                concurrency: 8,
                max_entries: Some(1_000),
                ..base
            },
            Profile::HighPerformance => ProfileSettings {
                initial_capacity: 1_024,
                concurrency: 64,
                max_entries: Some(100_000),
                ..base
            },
            Profile::SessionCache => ProfileSettings {
                strategy: EvictionStrategy::Lru,
                sketch: SketchVariant::None,
                expire_after_access: Some(Duration::from_secs(30 * 60)),
                ..base
            },
            Profile::ApiCache => ProfileSettings {
                max_entries: Some(20_000),
                expire_after_write: Some(Duration::from_secs(5 * 60)),
                ..base
            },
            Profile::ComputeCache => ProfileSettings {
                strategy: EvictionStrategy::Lfu,
                sketch: SketchVariant::Basic,
                max_entries: Some(5_000),
                ..base
            },
            Profile::MlOptimized => ProfileSettings {
                initial_capacity: 4_096,
                concurrency: 32,
                max_entries: Some(100_000),
                ..base
            },
            Profile::ZeroCopy => ProfileSettings {
                strategy: EvictionStrategy::Fifo,
                sketch: SketchVariant::None,
                initial_capacity: 64,
                concurrency: 8,
                ..base
            },
            Profile::HardwareOptimized => ProfileSettings {
                initial_capacity: 4_096,
                concurrency: 128,
                max_entries: Some(250_000),
                ..base
            },
            Profile::Distributed => ProfileSettings {
                max_entries: Some(50_000),
                expire_after_write: Some(Duration::from_secs(60)),
                ..base
            },
        }
    }
}

/// Runtime registry for custom named presets.
///
/// The built-in [`Profile`] table never changes; this handle only stores
/// additional presets registered by the embedding application.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    custom: RwLock<HashMap<String, ProfileSettings>>,
}

impl ProfileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        ProfileRegistry::default()
    }

    /// Registers or replaces a named preset.
    pub fn register(&self, name: impl Into<String>, settings: ProfileSettings) {
        self.custom.write().insert(name.into(), settings);
    }

    /// Looks up a previously registered preset.
    pub fn get(&self, name: &str) -> Option<ProfileSettings> {
        self.custom.read().get(name).copied()
    }

    /// Names of all registered presets, unordered.
    pub fn names(&self) -> Vec<String> {
        self.custom.read().keys().cloned().collect()
    }
}
