//! First-In-First-Out (FIFO) eviction policy.
//!
//! Keys are evicted strictly in insertion order; reads never reorder the
//! chain. Replacing an existing key keeps its original position. FIFO has
//! the lowest bookkeeping cost of the policies here and suits workloads
//! where recency carries no signal (append-mostly streams, fixed scans).

use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::list::{List, ListNode};
use crate::policy::{Access, AccessKind, EvictionPolicy};

/// Insertion-ordered policy: `select_victim` returns the oldest key.
pub(crate) struct FifoPolicy<K> {
    order: List<K>,
    index: HashMap<K, *mut ListNode<K>>,
}

// SAFETY: the raw pointers in `index` point only at nodes owned by `order`;
// moving the policy moves both together. Mutation requires &mut self.
unsafe impl<K: Send> Send for FifoPolicy<K> {}

impl<K: Clone + Eq + Hash> FifoPolicy<K> {
    pub(crate) fn new() -> Self {
        FifoPolicy {
            order: List::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, key: K) {
        if self.index.contains_key(&key) {
            // replacement keeps the original queue position
            return;
        }
        let node = self.order.push_front(key.clone());
        self.index.insert(key, node);
    }
}

impl<K: Clone + Eq + Hash + Send> EvictionPolicy<K> for FifoPolicy<K> {
    fn record(&mut self, access: Access<K>) {
        match access.kind {
            AccessKind::Read => {}
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

impl<K> fmt::Debug for FifoPolicy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoPolicy")
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

    #[test]
    fn victims_follow_insertion_order() {
        let mut policy = FifoPolicy::new();
        policy.record(write("a"));
        policy.record(write("b"));
        policy.record(write("c"));
        assert_eq!(policy.select_victim(), Some("a"));
        assert_eq!(policy.select_victim(), Some("b"));
        assert_eq!(policy.select_victim(), Some("c"));
        assert_eq!(policy.select_victim(), None);
    }

    #[test]
    fn reads_do_not_reorder() {
        let mut policy = FifoPolicy::new();
        policy.record(write("a"));
        policy.record(write("b"));
        policy.record(access("a", AccessKind::Read));
        assert_eq!(policy.select_victim(), Some("a"));
    }

    #[test]
    fn replacement_keeps_queue_position() {
        let mut policy = FifoPolicy::new();
        policy.record(write("a"));
        policy.record(write("b"));
        policy.record(write("a"));
        assert_eq!(policy.len(), 2);
        assert_eq!(policy.select_victim(), Some("a"));
    }

    #[test]
    fn removal_of_unknown_key_is_noop() {
        let mut policy: FifoPolicy<&str> = FifoPolicy::new();
        policy.on_remove(&"ghost");
        assert_eq!(policy.select_victim(), None);
    }
}
