//! Least Recently Used (LRU) eviction policy.
//!
//! Keys live on a recency-ordered intrusive list with a hash index for O(1)
//! lookup of the list node. A read or a write moves the key to the front;
//! the victim is always the tail.
//!
//! ```text
//!  front (most recent)                              back (victim)
//!    │                                                 │
//!    ▼                                                 ▼
//!  ┌─────┐ ◀──▶ ┌─────┐ ◀──▶ ┌─────┐ ◀──▶ ... ◀──▶ ┌─────┐
//!  │ "d" │      │ "a" │      │ "c" │               │ "b" │
//!  └─────┘      └─────┘      └─────┘               └─────┘
//!       ▲            ▲            ▲                     ▲
//!       └────────────┴── HashMap<K, *node> ────────────┘
//! ```
//!
//! LRU has no scan resistance: a single pass over many cold keys flushes
//! the hot set. Workloads that mix scans with a stable working set are
//! better served by [`TinyLfu`](crate::EvictionStrategy::TinyLfu).

use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::list::{List, ListNode};
use crate::policy::{Access, AccessKind, EvictionPolicy};

/// Recency-ordered policy: `select_victim` returns the least recently
/// accessed key.
pub(crate) struct LruPolicy<K> {
    order: List<K>,
    index: HashMap<K, *mut ListNode<K>>,
}

// SAFETY: the raw pointers in `index` point only at nodes owned by `order`;
// moving the policy moves both together. Mutation requires &mut self.
unsafe impl<K: Send> Send for LruPolicy<K> {}

impl<K: Clone + Eq + Hash> LruPolicy<K> {
    pub(crate) fn new() -> Self {
        LruPolicy {
            order: List::new(),
            index: HashMap::new(),
        }
    }

    fn touch(&mut self, key: &K) {
        if let Some(&node) = self.index.get(key) {
            // SAFETY: index entries always point at live nodes in `order`.
            unsafe { self.order.move_to_front(node) };
        }
    }

    fn insert(&mut self, key: K) {
        if self.index.contains_key(&key) {
            self.touch(&key);
            return;
        }
        let node = self.order.push_front(key.clone());
        self.index.insert(key, node);
    }
}

impl<K: Clone + Eq + Hash + Send> EvictionPolicy<K> for LruPolicy<K> {
    fn record(&mut self, access: Access<K>) {
        match access.kind {
            AccessKind::Read => self.touch(&access.key),
            AccessKind::Write => self.insert(access.key),
            AccessKind::Evict => self.on_remove(&access.key),
        }
    }

    fn on_remove(&mut self, key: &K) {
        if let Some(node) = self.index.remove(key) {
            // SAFETY: the node was live until this removal.
            unsafe { drop(self.order.remove(node)) };
        }
    }

    fn select_victim(&mut self) -> Option<K> {
        let key = self.order.pop_back()?;
        self.index.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

impl<K> fmt::Debug for LruPolicy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruPolicy")
            .field("len", &self.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::access;

    fn write(key: &str) -> Access<&str> {
        access(key, AccessKind::Write)
    }

    fn read(key: &str) -> Access<&str> {
        access(key, AccessKind::Read)
    }

    #[test]
    fn victim_is_least_recently_used() {
        let mut policy = LruPolicy::new();
        policy.record(write("a"));
        policy.record(write("b"));
        policy.record(write("c"));

        // touching "a" rescues it; "b" becomes the victim
        policy.record(read("a"));
        assert_eq!(policy.select_victim(), Some("b"));
        assert_eq!(policy.select_victim(), Some("c"));
        assert_eq!(policy.select_victim(), Some("a"));
        assert_eq!(policy.select_victim(), None);
    }

    #[test]
    fn rewrite_refreshes_recency() {
        let mut policy = LruPolicy::new();
        policy.record(write("a"));
        policy.record(write("b"));
        policy.record(write("a"));
        assert_eq!(policy.select_victim(), Some("b"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut policy: LruPolicy<&str> = LruPolicy::new();
        policy.record(read("ghost"));
        policy.on_remove(&"ghost");
        assert_eq!(policy.len(), 0);
        assert_eq!(policy.select_victim(), None);
    }

    #[test]
    fn evict_records_remove_keys() {
        let mut policy = LruPolicy::new();
        policy.record(write("a"));
        policy.record(write("b"));
        policy.record(access("a", AccessKind::Evict));
        assert_eq!(policy.len(), 1);
        assert_eq!(policy.select_victim(), Some("b"));
    }

    #[test]
    fn clear_resets_everything() {
        let mut policy = LruPolicy::new();
        for key in ["a", "b", "c"] {
            policy.record(write(key));
        }
        policy.clear();
        assert_eq!(policy.len(), 0);
        assert_eq!(policy.select_victim(), None);
    }
}
