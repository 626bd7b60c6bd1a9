// Roel Kluin, 2023, GPL v3

use crate::error::{GraphError, Result};
use bitvec::prelude::*;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

// bit set: slot is free.
type FreeMap = BitVec<AtomicU64, Lsb0>;

const WORD_BITS: usize = u64::BITS as usize;

/// Hands out dense ids in `[bias, bias + size)` and takes them back again.
///
/// Claiming and releasing a slot is a single atomic operation on the word holding its bit,
/// so `allocate`, `acquire` and `release` may run from many threads at once. Only `resize`
/// takes the map exclusively.
pub struct IdDistributor {
    bias: u64,
    free_map: RwLock<FreeMap>,
    last_allocated: AtomicU64,
}

/// Bits `[lo, hi)` of a word.
#[inline]
fn range_mask(lo: usize, hi: usize) -> u64 {
    let upper = if hi >= WORD_BITS {
        !0
    } else {
        (1_u64 << hi) - 1
    };
    upper & (!0_u64 << lo)
}

/// Clear the lowest set bit in slots `[from, to)`, returning its slot.
fn claim_first_free(words: &[AtomicU64], from: usize, to: usize) -> Option<usize> {
    let mut slot = from;
    while slot < to {
        let w = slot / WORD_BITS;
        let word_start = w * WORD_BITS;
        let mask = range_mask(slot - word_start, to - word_start);
        let word = &words[w];
        let mut cur = word.load(Ordering::Acquire);
        loop {
            let candidates = cur & mask;
            if candidates == 0 {
                break;
            }
            let bit = candidates.trailing_zeros() as usize;
            match word.compare_exchange_weak(
                cur,
                cur & !(1 << bit),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(word_start + bit),
                Err(actual) => cur = actual,
            }
        }
        slot = word_start + WORD_BITS;
    }
    None
}

impl IdDistributor {
    pub fn new(bias: u64, initial_size: usize) -> Self {
        IdDistributor {
            bias,
            free_map: RwLock::new(BitVec::repeat(true, initial_size)),
            last_allocated: AtomicU64::new(0),
        }
    }
    pub fn bias(&self) -> u64 {
        self.bias
    }
    pub fn size(&self) -> usize {
        self.free_map.read_recursive().len()
    }
    /// Number of free slots.
    pub fn free(&self) -> usize {
        self.free_map.read_recursive().count_ones()
    }
    pub fn occupied_count(&self) -> usize {
        self.free_map.read_recursive().count_zeros()
    }
    /// Slot index of `id` if it lies within the current range.
    pub fn slot(&self, id: u64) -> Option<usize> {
        let slot = usize::try_from(id.checked_sub(self.bias)?).ok()?;
        (slot < self.size()).then_some(slot)
    }

    /// Grow to at least `n` slots, all new slots free. Never shrinks.
    pub fn resize(&self, n: usize) {
        let mut map = self.free_map.write();
        if n > map.len() {
            debug!(bias = self.bias, from = map.len(), to = n, "growing id range");
            map.resize(n, true);
        }
    }

    /// Claim the lowest free slot at or after `last_allocated + offset`, wrapping around to
    /// zero once before giving up with `Exhausted`.
    pub fn allocate(&self, offset: u64) -> Result<u64> {
        let map = self.free_map.read_recursive();
        let len = map.len();
        let hint = self.last_allocated.load(Ordering::Relaxed).saturating_add(offset);
        let start = usize::try_from(hint).map_or(len, |h| h.min(len));
        let words = map.as_raw_slice();

        let slot = claim_first_free(words, start, len)
            .or_else(|| claim_first_free(words, 0, start))
            .ok_or(GraphError::Exhausted {
                bias: self.bias,
                capacity: len,
            })?;
        self.last_allocated.store(slot as u64, Ordering::Relaxed);
        Ok(self.bias + slot as u64)
    }

    /// Mark a predetermined id occupied, e.g. when loading a saved graph.
    pub fn acquire(&self, id: u64) -> Result<()> {
        let map = self.free_map.read_recursive();
        let slot = self.checked_slot(id, map.len())?;
        let bit = 1_u64 << (slot % WORD_BITS);
        let prev = map.as_raw_slice()[slot / WORD_BITS].fetch_and(!bit, Ordering::AcqRel);
        if prev & bit == 0 {
            return Err(GraphError::PreconditionViolated(format!(
                "id {id} is already occupied"
            )));
        }
        Ok(())
    }

    /// Return an id to the free pool. Releasing a free id is a bug: it traps in debug builds
    /// and is ignored otherwise.
    pub fn release(&self, id: u64) {
        let map = self.free_map.read_recursive();
        let Ok(slot) = self.checked_slot(id, map.len()) else {
            dbg_assert!(false, "release of id {} outside [{}, +{})", id, self.bias, map.len());
            return;
        };
        let bit = 1_u64 << (slot % WORD_BITS);
        let prev = map.as_raw_slice()[slot / WORD_BITS].fetch_or(bit, Ordering::AcqRel);
        dbg_assert!(prev & bit == 0, "double release of id {}", id);
    }

    pub fn occupied(&self, id: u64) -> bool {
        let map = self.free_map.read_recursive();
        self.checked_slot(id, map.len())
            .map_or(false, |slot| !map[slot])
    }

    /// Occupied ids in ascending order. Single pass; the result is unspecified if the
    /// distributor is mutated while the iterator is alive, and `resize` blocks until it is
    /// dropped.
    pub fn ids(&self) -> Ids<'_> {
        Ids {
            map: self.free_map.read_recursive(),
            bias: self.bias,
            next: 0,
        }
    }

    fn checked_slot(&self, id: u64, len: usize) -> Result<usize> {
        id.checked_sub(self.bias)
            .and_then(|s| usize::try_from(s).ok())
            .filter(|&s| s < len)
            .ok_or_else(|| {
                GraphError::PreconditionViolated(format!(
                    "id {id} outside [{}, {} + {len})",
                    self.bias, self.bias
                ))
            })
    }
}

pub struct Ids<'a> {
    map: RwLockReadGuard<'a, FreeMap>,
    bias: u64,
    next: usize,
}

impl Iterator for Ids<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let found = self.next + self.map.get(self.next..)?.first_zero()?;
        self.next = found + 1;
        Some(self.bias + found as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, Rng};
    use std::collections::HashSet;

    fn filled(n: usize) -> IdDistributor {
        let d = IdDistributor::new(0, n);
        for i in 0..n as u64 {
            assert_eq!(d.allocate(0).unwrap(), i);
        }
        d
    }

    #[test]
    fn allocates_in_order() {
        let d = IdDistributor::new(0, 130);
        let ids: Vec<u64> = (0..130).map(|_| d.allocate(0).unwrap()).collect();
        assert_eq!(ids, (0..130).collect::<Vec<_>>());
        assert!(d.allocate(0).unwrap_err().is_exhausted());
    }

    #[test]
    fn released_ids_are_reclaimed() {
        let d = filled(100);
        d.release(17);
        d.release(42);
        let again: HashSet<u64> = (0..2).map(|_| d.allocate(0).unwrap()).collect();
        assert_eq!(again, HashSet::from([17, 42]));
        assert_eq!(d.free(), 0);
    }

    #[test]
    fn allocation_scans_forward_from_hint() {
        let d = filled(200);
        for id in [3, 150, 160] {
            d.release(id);
        }
        // hint is at 199, so the scan wraps and finds the lowest free slot
        assert_eq!(d.allocate(0).unwrap(), 3);
        // hint is now 3: the next free slot after it
        assert_eq!(d.allocate(0).unwrap(), 150);
        assert_eq!(d.allocate(0).unwrap(), 160);
    }

    #[test]
    fn offset_skips_ahead() {
        let d = IdDistributor::new(0, 64);
        assert_eq!(d.allocate(10).unwrap(), 10);
        assert_eq!(d.allocate(0).unwrap(), 11);
        assert_eq!(d.allocate(100).unwrap(), 0);
    }

    #[test]
    fn exhausted_is_recovered_by_resize() {
        let d = filled(4);
        assert!(d.allocate(0).unwrap_err().is_exhausted());
        d.resize(2);
        assert_eq!(d.size(), 4);
        d.resize(8);
        assert_eq!(d.size(), 8);
        assert_eq!(d.allocate(0).unwrap(), 4);
    }

    #[test]
    fn bias_shifts_ids() {
        let d = IdDistributor::new(1_000, 10);
        assert_eq!(d.allocate(0).unwrap(), 1_000);
        assert!(d.occupied(1_000));
        assert!(!d.occupied(999));
        assert!(!d.occupied(1_010));
        assert_eq!(d.slot(1_005), Some(5));
        assert_eq!(d.slot(5), None);
    }

    #[test]
    fn acquire_marks_predetermined_ids() {
        let d = IdDistributor::new(0, 100);
        d.acquire(7).unwrap();
        d.acquire(70).unwrap();
        assert!(d.acquire(7).is_err());
        assert!(d.acquire(100).is_err());
        assert_eq!(d.ids().collect::<Vec<_>>(), vec![7, 70]);
        assert_eq!(d.occupied_count(), 2);
    }

    #[test]
    fn ids_match_occupied_bits() {
        let mut rng = thread_rng();
        let d = filled(300);
        let mut live: HashSet<u64> = (0..300).collect();
        for _ in 0..500 {
            let id = rng.gen_range(0..300);
            if live.remove(&id) {
                d.release(id);
            } else if rng.gen_bool(0.5) {
                let got = d.allocate(0).unwrap();
                assert!(live.insert(got), "{} handed out twice", got);
            }
        }
        let mut expected: Vec<u64> = live.iter().copied().collect();
        expected.sort_unstable();
        assert_eq!(d.ids().collect::<Vec<_>>(), expected);
        assert_eq!(d.free(), 300 - expected.len());
        for id in 0..300 {
            assert_eq!(d.occupied(id), live.contains(&id));
        }
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let threads = 8;
        let per_thread = 2_000;
        let d = IdDistributor::new(5, 64);
        let all: Vec<u64> = crossbeam::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|_| {
                        let mut got = Vec::with_capacity(per_thread);
                        while got.len() < per_thread {
                            let size = d.size();
                            match d.allocate(0) {
                                Ok(id) => got.push(id),
                                Err(e) if e.is_exhausted() => d.resize(size * 2),
                                Err(e) => panic!("{}", e),
                            }
                        }
                        got
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        })
        .unwrap();
        let distinct: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(distinct.len(), threads * per_thread);
        assert!(all.iter().all(|&id| id >= 5));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "double release")]
    fn double_release_traps_in_debug() {
        let d = filled(2);
        d.release(1);
        d.release(1);
    }
}
