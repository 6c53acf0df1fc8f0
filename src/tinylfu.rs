//! Windowed TinyLFU (W-TinyLFU) eviction policy.
//!
//! The cache's key space is logically partitioned into a small admission
//! window and a large main region:
//!
//! ```text
//!            new keys                       admission duel
//!               │                                │
//!               ▼                                ▼
//!  ┌────────────────────┐   candidate   ┌─────────────────────────────┐
//!  │   window (~1%)     │ ────────────▶ │   main region (~99%)        │
//!  │   plain LRU        │               │ ┌─────────────┬───────────┐ │
//!  └────────────────────┘               │ │ probationary│ protected │ │
//!                                       │ │    (~20%)   │  (~80%)   │ │
//!                                       │ └─────────────┴───────────┘ │
//!                                       └─────────────────────────────┘
//! ```
//!
//! New keys enter the window. When the window overflows, its oldest key
//! becomes a *candidate* for the main region: it is admitted only if the
//! frequency sketch estimates it to be more popular than the main region's
//! own victim (the probationary tail); otherwise the candidate itself is
//! evicted. Inside the main region a probationary key is promoted to the
//! protected segment on its next access, and protected overflow demotes
//! back to probationary, exactly as in a segmented LRU.
//!
//! The combination keeps one-shot keys (scans, crawlers) from displacing a
//! popular working set while the window still adapts quickly to genuinely
//! new hot keys.
//!
//! Without a sketch the admission duel defaults to admit, which degrades
//! the policy to a windowed segmented LRU.

use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::list::{List, ListNode};
use crate::policy::{Access, AccessKind, EvictionPolicy};
use crate::sketch::FrequencySketch;

/// Fraction of capacity given to the admission window, in percent.
const WINDOW_PERCENT: u64 = 1;

/// Fraction of the main region given to the protected segment, in percent.
const PROTECTED_PERCENT: u64 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Window,
    Probation,
    Protected,
}

/// Where a key lives and how it hashes for sketch lookups.
struct Slot<K> {
    region: Region,
    node: *mut ListNode<K>,
    hash: u64,
}

/// The default policy: W-TinyLFU over three intrusive recency lists.
pub(crate) struct TinyLfuPolicy<K> {
    window: List<K>,
    probation: List<K>,
    protected: List<K>,
    index: HashMap<K, Slot<K>>,
    window_cap: usize,
    main_cap: usize,
    protected_cap: usize,
    sketch: Option<Arc<FrequencySketch>>,
}

// SAFETY: all raw pointers in `index` target nodes owned by one of the
// three lists; the structure moves as a unit and mutation requires
// &mut self.
unsafe impl<K: Send> Send for TinyLfuPolicy<K> {}

impl<K: Clone + Eq + Hash> TinyLfuPolicy<K> {
    pub(crate) fn new(capacity: u64, sketch: Option<Arc<FrequencySketch>>) -> Self {
        let capacity = capacity.max(1);
        let window_cap = ((capacity * WINDOW_PERCENT) / 100).max(1);
        let main_cap = capacity.saturating_sub(window_cap);
        let protected_cap = main_cap.saturating_mul(PROTECTED_PERCENT) / 100;
        TinyLfuPolicy {
            window: List::new(),
            probation: List::new(),
            protected: List::new(),
            index: HashMap::new(),
            window_cap: usize::try_from(window_cap).unwrap_or(usize::MAX),
            main_cap: usize::try_from(main_cap).unwrap_or(usize::MAX),
            protected_cap: usize::try_from(protected_cap).unwrap_or(usize::MAX),
            sketch,
        }
    }

    /// Whether a window candidate displaces the main region's victim.
    ///
    /// With a sketch, the candidate must be strictly more popular than the
    /// incumbent. Without one there is no popularity history to consult,
    /// so candidates are admitted unconditionally and the policy behaves
    /// as a windowed segmented LRU.
    fn admits(&self, candidate_hash: u64, victim_hash: u64) -> bool {
        match &self.sketch {
            Some(sketch) => sketch.frequency(candidate_hash) > sketch.frequency(victim_hash),
            None => true,
        }
    }

    fn main_len(&self) -> usize {
        self.probation.len() + self.protected.len()
    }

    fn list_of(&mut self, region: Region) -> &mut List<K> {
        match region {
            Region::Window => &mut self.window,
            Region::Probation => &mut self.probation,
            Region::Protected => &mut self.protected,
        }
    }

    /// Removes a key from its list and the index. Returns false for
    /// untracked keys.
    fn forget(&mut self, key: &K) -> bool {
        let Some(slot) = self.index.remove(key) else {
            return false;
        };
        let node = slot.node;
        // SAFETY: slots always reference nodes live in their region's list.
        unsafe { drop(self.list_of(slot.region).remove(node)) };
        true
    }

    /// Migrates the window's oldest key into the probationary segment.
    fn admit_window_victim(&mut self) {
        let Some(key) = self.window.back().cloned() else {
            return;
        };
        let slot = self.index.get_mut(&key).expect("window key missing from index");
        let node = slot.node;
        // SAFETY: the node is live in `window` per the slot invariant.
        let detached = unsafe { self.window.remove(node) };
        let new_node = self.probation.push_front_node(detached);
        let slot = self.index.get_mut(&key).expect("window key missing from index");
        slot.region = Region::Probation;
        slot.node = new_node;
    }

    fn touch(&mut self, key: &K) {
        let Some(slot) = self.index.get(key) else {
            return;
        };
        let node = slot.node;
        match slot.region {
            Region::Window => {
                // SAFETY: live node in `window`.
                unsafe { self.window.move_to_front(node) };
            }
            Region::Protected => {
                // SAFETY: live node in `protected`.
                unsafe { self.protected.move_to_front(node) };
            }
            Region::Probation => {
                // Promotion: the second access earns a protected seat.
                // SAFETY: live node in `probation`.
                let detached = unsafe { self.probation.remove(node) };
                let new_node = self.protected.push_front_node(detached);
                let slot = self.index.get_mut(key).expect("probation key missing from index");
                slot.region = Region::Protected;
                slot.node = new_node;

                // Protected overflow demotes its coldest key back.
                if self.protected.len() > self.protected_cap {
                    if let Some(demoted) = self.protected.pop_back() {
                        let back = self.probation.push_front(demoted.clone());
                        if let Some(slot) = self.index.get_mut(&demoted) {
                            slot.region = Region::Probation;
                            slot.node = back;
                        }
                    }
                }
            }
        }
    }

    fn insert(&mut self, key: K, hash: u64) {
        if self.index.contains_key(&key) {
            self.touch(&key);
            return;
        }
        let node = self.window.push_front(key.clone());
        self.index.insert(
            key,
            Slot {
                region: Region::Window,
                node,
                hash,
            },
        );
    }
}

impl<K: Clone + Eq + Hash + Send> EvictionPolicy<K> for TinyLfuPolicy<K> {
    fn record(&mut self, access: Access<K>) {
        // Reads and writes both feed the popularity history.
        if matches!(access.kind, AccessKind::Read | AccessKind::Write) {
            if let Some(sketch) = &self.sketch {
                sketch.increment(access.hash);
            }
        }
        match access.kind {
            AccessKind::Read => self.touch(&access.key),
            AccessKind::Write => self.insert(access.key, access.hash),
            AccessKind::Evict => self.on_remove(&access.key),
        }
    }

    fn on_remove(&mut self, key: &K) {
        self.forget(key);
    }

    fn select_victim(&mut self) -> Option<K> {
        // Drain window overflow first: each overflowing key either earns a
        // probationary seat or is itself the victim.
        while self.window.len() > self.window_cap {
            if self.main_len() < self.main_cap {
                self.admit_window_victim();
                continue;
            }

            let candidate = self.window.back().cloned()?;

            let victim = self
                .probation
                .back()
                .or_else(|| self.protected.back())
                .cloned();
            let Some(victim) = victim else {
                // No main region to duel against; the candidate loses.
                self.forget(&candidate);
                return Some(candidate);
            };

            let candidate_hash = self.index[&candidate].hash;
            let victim_hash = self.index[&victim].hash;
            return if self.admits(candidate_hash, victim_hash) {
                self.admit_window_victim();
                self.forget(&victim);
                Some(victim)
            } else {
                self.forget(&candidate);
                Some(candidate)
            };
        }

        // Window within bounds: shrink the main region, probation first.
        if let Some(key) = self.probation.pop_back() {
            self.index.remove(&key);
            return Some(key);
        }
        if let Some(key) = self.protected.pop_back() {
            self.index.remove(&key);
            return Some(key);
        }
        let key = self.window.pop_back()?;
        self.index.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.window.clear();
        self.probation.clear();
        self.protected.clear();
        self.index.clear();
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

impl<K> fmt::Debug for TinyLfuPolicy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TinyLfuPolicy")
            .field("window", &self.window.len())
            .field("probation", &self.probation.len())
            .field("protected", &self.protected.len())
            .field("window_cap", &self.window_cap)
            .field("protected_cap", &self.protected_cap)
            .finish()
    }
}
