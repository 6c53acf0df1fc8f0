//! Least Frequently Used (LFU) eviction policy with O(1) operations.
//!
//! The structure is a doubly linked list of frequency buckets in ascending
//! order, where each bucket holds the keys sharing one access count on its
//! own recency list:
//!
//! ```text
//!  min frequency                                 max frequency
//!       │                                              │
//!       ▼                                              ▼
//!  ┌──────────┐      ┌──────────┐      ┌──────────┐
//!  │ freq = 1 │ ◀──▶ │ freq = 3 │ ◀──▶ │ freq = 9 │
//!  │ [d ↔ c]  │      │ [a]      │      │ [hot]    │
//!  └──────────┘      └──────────┘      └──────────┘
//!        ▲
//!        └── victims come from the back of this bucket's list
//! ```
//!
//! Every operation touches a constant number of nodes:
//!
//! - the minimum-frequency bucket is the front of the bucket list;
//! - an access detaches the key node and splices it into the neighboring
//!   `freq + 1` bucket, creating that bucket in place if missing;
//! - a bucket that empties is unlinked immediately, so no empty bucket is
//!   ever traversed.
//!
//! Within a bucket keys are ordered by recency, so the victim among the
//! least-frequently-used keys is also the least recently used one.
//!
//! Pure LFU retains once-popular keys indefinitely. When popularity decays
//! over time, [`TinyLfu`](crate::EvictionStrategy::TinyLfu) with its aged
//! sketch adapts where LFU cannot.

use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::list::{List, ListNode};
use crate::policy::{Access, AccessKind, EvictionPolicy};

/// A run of keys sharing the same access count.
struct Bucket<K> {
    freq: u64,
    /// Keys at this frequency, most recently touched at the front.
    items: List<K>,
}

impl<K> Bucket<K> {
    fn new(freq: u64) -> Self {
        Bucket {
            freq,
            items: List::new(),
        }
    }
}

/// Where a key lives: its bucket node and its item node within the bucket.
struct Slot<K> {
    bucket: *mut ListNode<Bucket<K>>,
    item: *mut ListNode<K>,
}

/// Frequency-ordered policy: `select_victim` returns the least recently
/// used key of the minimum-frequency bucket.
pub(crate) struct LfuPolicy<K> {
    /// Buckets in ascending frequency order; the front is the minimum.
    buckets: List<Bucket<K>>,
    index: HashMap<K, Slot<K>>,
}

// SAFETY: all raw pointers in `index` target nodes owned by `buckets` (or
// by an item list inside one of its bucket payloads); the whole structure
// moves as one unit and mutation requires &mut self.
unsafe impl<K: Send> Send for LfuPolicy<K> {}

impl<K: Clone + Eq + Hash> LfuPolicy<K> {
    pub(crate) fn new() -> Self {
        LfuPolicy {
            buckets: List::new(),
            index: HashMap::new(),
        }
    }

    /// Inserts a brand-new key at frequency 1.
    fn insert(&mut self, key: K) {
        // The minimum bucket is the front; reuse it if it is the freq-1
        // bucket, otherwise link a fresh one at the front.
        let bucket = match self.buckets.front_ptr() {
            // SAFETY: front_ptr returns live payload nodes.
            Some(ptr) if unsafe { (*ptr).value() }.freq == 1 => ptr,
            _ => self.buckets.push_front(Bucket::new(1)),
        };
        // SAFETY: bucket is linked and carries a payload.
        let item = unsafe { (*bucket).value_mut() }.items.push_front(key.clone());
        self.index.insert(key, Slot { bucket, item });
    }

    /// Moves a key from its bucket to the `freq + 1` neighbor.
    fn promote(&mut self, key: &K) {
        let Some(slot) = self.index.get(key) else {
            return;
        };
        let bucket = slot.bucket;
        let item = slot.item;

        // SAFETY: slots always reference live nodes.
        let freq = unsafe { (*bucket).value() }.freq;
        let detached = unsafe { (*bucket).value_mut().items.remove(item) };

        // Reuse the next bucket when it is exactly freq + 1; otherwise
        // splice a new bucket in between to keep ascending order.
        // SAFETY: bucket is still linked in `buckets`.
        let target = match unsafe { self.buckets.next_of(bucket) } {
            Some(next) if unsafe { (*next).value() }.freq == freq + 1 => next,
            _ => unsafe { self.buckets.insert_after(bucket, Bucket::new(freq + 1)) },
        };
        // SAFETY: target was just located or created within `buckets`.
        let new_item = unsafe { (*target).value_mut() }.items.push_front_node(detached);

        // SAFETY: bucket is still linked; unlink it if it emptied.
        if unsafe { (*bucket).value() }.items.is_empty() {
            unsafe { drop(self.buckets.remove(bucket)) };
        }

        let slot = self.index.get_mut(key).expect("slot vanished during promote");
        slot.bucket = target;
        slot.item = new_item;
    }
}

impl<K: Clone + Eq + Hash + Send> EvictionPolicy<K> for LfuPolicy<K> {
    fn record(&mut self, access: Access<K>) {
        match access.kind {
            AccessKind::Read => self.promote(&access.key),
            AccessKind::Write => {
                if self.index.contains_key(&access.key) {
                    self.promote(&access.key);
                } else {
                    self.insert(access.key);
                }
            }
            AccessKind::Evict => self.on_remove(&access.key),
        }
    }

    fn on_remove(&mut self, key: &K) {
        if let Some(slot) = self.index.remove(key) {
            // SAFETY: slots always reference live nodes.
            unsafe {
                drop((*slot.bucket).value_mut().items.remove(slot.item));
                if (*slot.bucket).value().items.is_empty() {
                    drop(self.buckets.remove(slot.bucket));
                }
            }
        }
    }

    fn select_victim(&mut self) -> Option<K> {
        let bucket = self.buckets.front_ptr()?;
        // SAFETY: linked buckets are never empty, so the front bucket holds
        // at least one item.
        let key = unsafe { (*bucket).value_mut() }.items.pop_back()?;
        // SAFETY: bucket is still linked.
        if unsafe { (*bucket).value() }.items.is_empty() {
            unsafe { drop(self.buckets.remove(bucket)) };
        }
        self.index.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

impl<K> fmt::Debug for LfuPolicy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LfuPolicy")
            .field("len", &self.index.len())
            .field("buckets", &self.buckets.len())
            .finish()
    }
}
