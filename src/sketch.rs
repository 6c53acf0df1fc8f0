//! Count-Min frequency sketch with doorkeeper and periodic aging.
//!
//! The sketch estimates how often a key has been accessed using a fixed
//! budget of memory: a flat array of 64-bit words, each packing sixteen
//! 4-bit saturating counters. Four hash functions map a key to four
//! counters; the estimate is the minimum of the four reads, which bounds
//! over-counting from hash collisions.
//!
//! Two refinements keep the estimates fresh and cheap:
//!
//! - **Doorkeeper** ([`SketchVariant::Optimized`]): a single-bit bloom
//!   filter absorbs the first access to each key, so one-shot keys never
//!   pollute the counters.
//! - **Aging**: after a sample window of observed increments the whole
//!   table is halved (`counter >> 1`), letting recent popularity dominate
//!   stale history. Every eighth aging pass also clears the doorkeeper.
//!
//! Increments use compare-and-swap loops on the underlying words, so the
//! sketch tolerates concurrent writers without locks. Estimates are
//! probabilistic; a lost race only costs a little accuracy.

use std::sync::atomic::{AtomicU64, Ordering};

/// Which frequency-sketch implementation a cache should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SketchVariant {
    /// No sketch. Frequency-based admission degrades to always-admit.
    None,
    /// Count-Min counters with aging but no doorkeeper.
    Basic,
    /// Count-Min counters with doorkeeper and aging.
    #[default]
    Optimized,
}

// A mixture of seeds from FNV-1a, CityHash, and Murmur3, one per hash function.
static SEED: [u64; 4] = [
    0xc3a5_c85c_97cb_3127,
    0xb492_b66f_be98_f273,
    0x9ae1_6a3b_2f90_404f,
    0xcbf2_9ce4_8422_2325,
];

/// Clears the top bit of each 4-bit counter after a right shift.
const RESET_MASK: u64 = 0x7777_7777_7777_7777;

/// Saturation ceiling for a 4-bit counter.
const MAX_COUNT: u64 = 15;

/// How many aging passes between doorkeeper clears.
const DOORKEEPER_RESET_INTERVAL: u64 = 8;

/// A concurrent Count-Min sketch over pre-hashed keys.
pub(crate) struct FrequencySketch {
    table: Box<[AtomicU64]>,
    table_mask: u64,
    doorkeeper: Option<Doorkeeper>,
    sample_size: u64,
    ops: AtomicU64,
    resets: AtomicU64,
}

impl FrequencySketch {
    /// Builds a sketch for a cache bounded at `capacity` entries, or `None`
    /// for [`SketchVariant::None`].
    pub(crate) fn build(variant: SketchVariant, capacity: u64) -> Option<Self> {
        match variant {
            SketchVariant::None => None,
            SketchVariant::Basic => Some(Self::with_capacity(capacity, false)),
            SketchVariant::Optimized => Some(Self::with_capacity(capacity, true)),
        }
    }

    fn with_capacity(capacity: u64, doorkeeper: bool) -> Self {
        let capacity = capacity.max(1).min(1 << 30);
        let table_size = (2 * capacity).next_power_of_two().max(8) as usize;
        let table = (0..table_size)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let sample_size = (capacity.saturating_mul(10)).min(i32::MAX as u64);
        FrequencySketch {
            table,
            table_mask: table_size as u64 - 1,
            doorkeeper: doorkeeper.then(|| Doorkeeper::new(table_size)),
            sample_size,
            ops: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    /// Records one access for a pre-hashed key.
    ///
    /// With a doorkeeper, the first access only sets the doorkeeper bit.
    /// Subsequent accesses apply a conservative update: of the four mapped
    /// counters, only those equal to the current minimum (and below the
    /// saturation ceiling) are bumped.
    pub(crate) fn increment(&self, hash: u64) {
        if let Some(dk) = &self.doorkeeper {
            if dk.insert(hash) {
                self.count_op();
                return;
            }
        }

        let start = (hash & 3) << 2;
        let mut counts = [0_u64; 4];
        let mut indexes = [0_usize; 4];
        for i in 0..4 {
            indexes[i] = self.index_of(hash, i);
            counts[i] = self.read_counter(indexes[i], start + i as u64);
        }
        let min = *counts.iter().min().unwrap_or(&0);
        if min < MAX_COUNT {
            for i in 0..4 {
                if counts[i] == min {
                    self.bump_counter(indexes[i], start + i as u64, min);
                }
            }
        }
        self.count_op();
    }

    /// Estimated access count of a pre-hashed key, in `[0, 15]`.
    pub(crate) fn frequency(&self, hash: u64) -> u64 {
        if let Some(dk) = &self.doorkeeper {
            if !dk.contains(hash) {
                return 0;
            }
        }
        let start = (hash & 3) << 2;
        let mut freq = MAX_COUNT;
        for i in 0..4 {
            let count = self.read_counter(self.index_of(hash, i), start + i as u64);
            freq = freq.min(count);
        }
        freq
    }

    /// Halves every counter. Called automatically once the sample window is
    /// exhausted; exposed for deterministic tests.
    pub(crate) fn reset(&self) {
        for word in self.table.iter() {
            let mut current = word.load(Ordering::Relaxed);
            loop {
                let aged = (current >> 1) & RESET_MASK;
                match word.compare_exchange_weak(
                    current,
                    aged,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        }
        let passes = self.resets.fetch_add(1, Ordering::Relaxed) + 1;
        if passes % DOORKEEPER_RESET_INTERVAL == 0 {
            if let Some(dk) = &self.doorkeeper {
                dk.clear();
            }
        }
    }

    /// Clears all counters, the doorkeeper, and the sampling state.
    pub(crate) fn clear(&self) {
        for word in self.table.iter() {
            word.store(0, Ordering::Relaxed);
        }
        if let Some(dk) = &self.doorkeeper {
            dk.clear();
        }
        self.ops.store(0, Ordering::Relaxed);
    }

    fn count_op(&self) {
        let ops = self.ops.fetch_add(1, Ordering::Relaxed) + 1;
        if ops >= self.sample_size {
            // Elect a single ager; losers observe a non-matching value.
            if self
                .ops
                .compare_exchange(ops, 0, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                self.reset();
            }
        }
    }

    #[inline]
    fn index_of(&self, hash: u64, depth: usize) -> usize {
        let mut h = hash.wrapping_add(SEED[depth]).wrapping_mul(SEED[depth]);
        h = h.wrapping_add(h >> 32);
        (h & self.table_mask) as usize
    }

    #[inline]
    fn read_counter(&self, index: usize, counter: u64) -> u64 {
        let offset = counter << 2;
        (self.table[index].load(Ordering::Relaxed) >> offset) & 0xF
    }

    /// Bumps one 4-bit counter by one if it still holds `expected`.
    /// A lost race leaves the counter to the winner; the estimate only
    /// loses precision, never correctness.
    fn bump_counter(&self, index: usize, counter: u64, expected: u64) {
        let offset = counter << 2;
        let mask = 0xF_u64 << offset;
        let word = &self.table[index];
        let mut current = word.load(Ordering::Relaxed);
        loop {
            let observed = (current & mask) >> offset;
            if observed != expected || observed >= MAX_COUNT {
                return;
            }
            let updated = current + (1 << offset);
            match word.compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(now) => current = now,
            }
        }
    }
}

impl std::fmt::Debug for FrequencySketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencySketch")
            .field("table_words", &self.table.len())
            .field("sample_size", &self.sample_size)
            .field("doorkeeper", &self.doorkeeper.is_some())
            .finish()
    }
}

/// Single-bit bloom filter absorbing the first access to each key.
struct Doorkeeper {
    bits: Box<[AtomicU64]>,
    bit_mask: u64,
}

impl Doorkeeper {
    fn new(table_size: usize) -> Self {
        // Sized to roughly a sixth of the counter table's bit budget,
        // rounded to a power of two for cheap masking.
        let bit_count = ((table_size * 64) / 6).next_power_of_two().max(64);
        let words = bit_count / 64;
        let bits = (0..words)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Doorkeeper {
            bits,
            bit_mask: bit_count as u64 - 1,
        }
    }

    /// Sets the key's bit. Returns `true` if this call set it (first sight).
    fn insert(&self, hash: u64) -> bool {
        let bit = hash & self.bit_mask;
        let word = (bit / 64) as usize;
        let mask = 1_u64 << (bit % 64);
        let prev = self.bits[word].fetch_or(mask, Ordering::Relaxed);
        prev & mask == 0
    }

    fn contains(&self, hash: u64) -> bool {
        let bit = hash & self.bit_mask;
        let word = (bit / 64) as usize;
        let mask = 1_u64 << (bit % 64);
        self.bits[word].load(Ordering::Relaxed) & mask != 0
    }

    fn clear(&self) {
        for word in self.bits.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash};

    fn hasher<K: Hash>() -> impl Fn(K) -> u64 {
        let state = RandomState::new();
        move |key| state.hash_one(&key)
    }

    #[test]
    fn basic_variant_counts_every_increment() {
        let sketch = FrequencySketch::build(SketchVariant::Basic, 512).unwrap();
        let h = hasher();
        sketch.increment(h("k"));
        assert_eq!(sketch.frequency(h("k")), 1);
        assert_eq!(sketch.frequency(h("other")), 0);
    }

    #[test]
    fn optimized_variant_doorkeeper_absorbs_first_access() {
        let sketch = FrequencySketch::build(SketchVariant::Optimized, 512).unwrap();
        let h = hasher();
        sketch.increment(h("k"));
        // first access only sets the doorkeeper bit
        assert_eq!(sketch.frequency(h("k")), 0);
        sketch.increment(h("k"));
        assert_eq!(sketch.frequency(h("k")), 1);
        // keys never seen report zero
        assert_eq!(sketch.frequency(h("unseen")), 0);
    }

    #[test]
    fn counters_saturate_at_fifteen() {
        let sketch = FrequencySketch::build(SketchVariant::Basic, 512).unwrap();
        let h = hasher();
        for _ in 0..100 {
            sketch.increment(h("hot"));
        }
        assert_eq!(sketch.frequency(h("hot")), 15);
    }

    #[test]
    fn reset_halves_estimates() {
        let sketch = FrequencySketch::build(SketchVariant::Basic, 512).unwrap();
        let h = hasher();
        for _ in 0..15 {
            sketch.increment(h("k"));
        }
        assert_eq!(sketch.frequency(h("k")), 15);
        sketch.reset();
        assert_eq!(sketch.frequency(h("k")), 7);
    }

    #[test]
    fn reset_never_exceeds_half_rounded_up() {
        let sketch = FrequencySketch::build(SketchVariant::Basic, 64).unwrap();
        let h = hasher();
        for i in 0_u64..64 {
            for _ in 0..(i % 16) {
                sketch.increment(h(i));
            }
        }
        let before: Vec<u64> = (0_u64..64).map(|i| sketch.frequency(h(i))).collect();
        sketch.reset();
        for (i, prev) in before.iter().enumerate() {
            let after = sketch.frequency(h(i as u64));
            assert!(after <= prev.div_ceil(2), "key {i}: {prev} -> {after}");
        }
    }

    #[test]
    fn aging_triggers_after_sample_window() {
        // capacity 8 gives a sample size of 80 increments
        let sketch = FrequencySketch::build(SketchVariant::Basic, 8).unwrap();
        let h = hasher();
        for _ in 0..16 {
            sketch.increment(h("hot"));
        }
        assert_eq!(sketch.frequency(h("hot")), 15);
        let h_u64 = hasher::<u64>();
        for i in 0_u64..200 {
            sketch.increment(h_u64(i));
        }
        // at least one aging pass must have halved the hot key
        assert!(sketch.frequency(h("hot")) < 15);
    }

    #[test]
    fn doorkeeper_survives_seven_resets() {
        let sketch = FrequencySketch::build(SketchVariant::Optimized, 512).unwrap();
        let h = hasher();
        sketch.increment(h("k"));
        for _ in 0..7 {
            sketch.reset();
        }
        // doorkeeper bit still set: this increment reaches the counters
        sketch.increment(h("k"));
        assert_eq!(sketch.frequency(h("k")), 1);
    }

    #[test]
    fn doorkeeper_clears_every_eighth_reset() {
        let sketch = FrequencySketch::build(SketchVariant::Optimized, 512).unwrap();
        let h = hasher();
        sketch.increment(h("k"));
        for _ in 0..8 {
            sketch.reset();
        }
        // eighth pass wiped the doorkeeper, so the next increment is
        // absorbed again instead of reaching the counters
        sketch.increment(h("k"));
        assert_eq!(sketch.frequency(h("k")), 0);
        sketch.increment(h("k"));
        assert_eq!(sketch.frequency(h("k")), 1);
    }

    #[test]
    fn heavier_keys_estimate_higher() {
        let sketch = FrequencySketch::build(SketchVariant::Basic, 512).unwrap();
        let h = hasher();
        for i in 100_u64..10_000 {
            sketch.increment(h(i));
        }
        for i in (0_u64..10).step_by(2) {
            for _ in 0..i {
                sketch.increment(h(i));
            }
        }
        let estimates: Vec<u64> = (0_u64..10).map(|i| sketch.frequency(h(i))).collect();
        assert!(estimates[2] <= estimates[4]);
        assert!(estimates[4] <= estimates[6]);
        assert!(estimates[6] <= estimates[8]);
    }

    #[test]
    fn concurrent_increments_stay_bounded() {
        use std::sync::Arc;
        let sketch = Arc::new(FrequencySketch::build(SketchVariant::Optimized, 1024).unwrap());
        let state = RandomState::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sketch = Arc::clone(&sketch);
            let state = state.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0_u64..10_000 {
                    sketch.increment(state.hash_one(i % 64));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("sketch thread panicked");
        }
        for i in 0_u64..64 {
            assert!(sketch.frequency(state.hash_one(i)) <= 15);
        }
    }

    #[test]
    fn clear_wipes_everything() {
        let sketch = FrequencySketch::build(SketchVariant::Optimized, 128).unwrap();
        let h = hasher();
        for _ in 0..10 {
            sketch.increment(h("k"));
        }
        sketch.clear();
        assert_eq!(sketch.frequency(h("k")), 0);
    }

    #[test]
    fn none_variant_builds_nothing() {
        assert!(FrequencySketch::build(SketchVariant::None, 128).is_none());
    }
}
