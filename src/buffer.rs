//! Striped access buffer.
//!
//! The hot path must never synchronize with the eviction policy, so reads
//! and writes record themselves here instead: a fixed set of ring buffers
//! ("stripes"), each guarded by its own mutex that producers only ever
//! `try_lock`. A producer that loses the race for its stripe, or finds the
//! ring full, drops the record on the floor: the cache stays correct, the
//! policy just sees slightly less history. Producers therefore never block
//! and never allocate: the rings are preallocated at construction.
//!
//! Stripes are selected by key hash, which keeps the records of one key in
//! FIFO order within a stripe. A single drainer (serialized by the cache's
//! maintenance state) empties every stripe and applies the records to the
//! policy in batch.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::policy::Access;

/// How many records a single stripe can hold before producers drop.
const STRIPE_CAPACITY: usize = 64;

/// Pending-record count that should trigger an opportunistic drain.
pub(crate) const DRAIN_THRESHOLD: usize = 64;

/// A buffered access stamped with its global arrival order.
struct Record<K> {
    seq: u64,
    access: Access<K>,
}

/// Fixed-capacity striped buffer of access records.
pub(crate) struct AccessBuffer<K> {
    stripes: Box<[Mutex<VecDeque<Record<K>>>]>,
    stripe_mask: u64,
    seq: AtomicU64,
    pending: AtomicUsize,
    dropped: AtomicUsize,
}

impl<K> AccessBuffer<K> {
    /// Creates a buffer with `stripes` rings (rounded up to a power of two).
    pub(crate) fn new(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        let stripes = (0..count)
            .map(|_| Mutex::new(VecDeque::with_capacity(STRIPE_CAPACITY)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        AccessBuffer {
            stripes,
            stripe_mask: count as u64 - 1,
            seq: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Records an access without blocking.
    ///
    /// Returns `false` when the record was dropped because the stripe was
    /// contended or full.
    pub(crate) fn push(&self, access: Access<K>) -> bool {
        let stripe = &self.stripes[(access.hash & self.stripe_mask) as usize];
        match stripe.try_lock() {
            Some(mut ring) => {
                if ring.len() >= STRIPE_CAPACITY {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                ring.push_back(Record { seq, access });
                self.pending.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                // another producer holds the stripe: one of us loses
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Approximate number of buffered records.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Total number of records dropped since construction.
    #[allow(dead_code)]
    pub(crate) fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Empties every stripe into `apply`, replaying records in arrival
    /// order across stripes.
    ///
    /// The caller serializes drains (only one runs at a time); this method
    /// takes each stripe lock blocking, which is safe because producers
    /// only ever `try_lock` and shed on contention. The drainer allocates;
    /// producers never do.
    pub(crate) fn drain(&self, mut apply: impl FnMut(Access<K>)) {
        let mut batch: Vec<Record<K>> = Vec::new();
        for stripe in self.stripes.iter() {
            let mut ring = stripe.lock();
            batch.extend(ring.drain(..));
        }
        if batch.is_empty() {
            return;
        }
        self.pending.fetch_sub(batch.len(), Ordering::Relaxed);
        batch.sort_unstable_by_key(|record| record.seq);
        for record in batch {
            apply(record.access);
        }
    }
}

impl<K> std::fmt::Debug for AccessBuffer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessBuffer")
            .field("stripes", &self.stripes.len())
            .field("pending", &self.pending())
            .finish()
    }
}
