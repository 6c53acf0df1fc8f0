//! Eviction policy abstraction.
//!
//! A policy owns an ordering structure over the cached keys and answers one
//! question: which key should leave next. Policies never touch the entry
//! store; the facade feeds them batched [`Access`] records drained from the
//! access buffer and asks for victims when a bound is exceeded.
//!
//! Policies are single-writer structures. The cache guards its policy with
//! a `RwLock` and only the drainer mutates it, so implementations are free
//! to use the intrusive list machinery without internal synchronization.
//!
//! All implementations tolerate records for keys they have never seen and
//! removals of keys they no longer track; both are no-ops.

use std::sync::Arc;

use crate::fifo::FifoPolicy;
use crate::lfu::LfuPolicy;
use crate::lru::LruPolicy;
use crate::sketch::FrequencySketch;
use crate::tinylfu::TinyLfuPolicy;

/// Which eviction policy a cache uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvictionStrategy {
    /// Least recently used.
    Lru,
    /// Insertion order; reads do not reorder.
    Fifo,
    /// Least frequently used with O(1) frequency buckets.
    Lfu,
    /// Windowed TinyLFU: a small recency window in front of a segmented
    /// main region with frequency-gated admission. The default.
    #[default]
    TinyLfu,
}

/// What kind of operation produced an access record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessKind {
    /// A lookup hit the key.
    Read,
    /// The key was inserted or replaced.
    Write,
    /// The key left the store (explicit removal or expiration).
    Evict,
}

/// One recorded cache access, queued in the access buffer and applied to
/// the policy during a drain.
#[derive(Debug, Clone)]
pub(crate) struct Access<K> {
    pub(crate) key: K,
    pub(crate) hash: u64,
    pub(crate) kind: AccessKind,
}

/// The ordering half of the cache: tracks key popularity and picks victims.
pub(crate) trait EvictionPolicy<K>: Send {
    /// Applies one drained access record.
    fn record(&mut self, access: Access<K>);

    /// Forgets a key. Unknown keys are ignored.
    fn on_remove(&mut self, key: &K);

    /// Picks and forgets the next eviction victim, if any key is tracked.
    fn select_victim(&mut self) -> Option<K>;

    /// Forgets everything.
    fn clear(&mut self);

    /// Number of keys currently tracked. Exposed for tests and debugging.
    fn len(&self) -> usize;
}

/// Explicit policy factory keyed by the strategy enum.
pub(crate) fn build_policy<K>(
    strategy: EvictionStrategy,
    capacity: u64,
    sketch: Option<Arc<FrequencySketch>>,
) -> Box<dyn EvictionPolicy<K>>
where
    K: Clone + Eq + std::hash::Hash + Send + 'static,
{
    match strategy {
        EvictionStrategy::Lru => Box::new(LruPolicy::new()),
        EvictionStrategy::Fifo => Box::new(FifoPolicy::new()),
        EvictionStrategy::Lfu => Box::new(LfuPolicy::new()),
        EvictionStrategy::TinyLfu => Box::new(TinyLfuPolicy::new(capacity, sketch)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Shorthand for feeding a policy in tests. `DefaultHasher::new()` is
    /// deterministic, so repeated calls hash the same key identically and
    /// TinyLFU admission sees stable values.
    pub(crate) fn access<K: std::hash::Hash + Clone>(key: K, kind: AccessKind) -> Access<K> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        Access {
            key,
            hash: hasher.finish(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_tinylfu() {
        assert_eq!(EvictionStrategy::default(), EvictionStrategy::TinyLfu);
    }

    #[test]
    fn factory_builds_every_strategy() {
        for strategy in [
            EvictionStrategy::Lru,
            EvictionStrategy::Fifo,
            EvictionStrategy::Lfu,
            EvictionStrategy::TinyLfu,
        ] {
            let policy: Box<dyn EvictionPolicy<String>> = build_policy(strategy, 100, None);
            assert_eq!(policy.len(), 0);
        }
    }
}
