// Roel Kluin, 2023, GPL v3

use crate::error::{GraphError, Result};
use crate::ids::EntityId;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

const UNPAIRED: u64 = u64::MAX;

/// The twin involution, one atomic word per slot holding the raw id of the twin.
pub struct ConjugateIndex<I> {
    bias: u64,
    twins: RwLock<Vec<AtomicU64>>,
    _id: PhantomData<I>,
}

impl<I: EntityId> ConjugateIndex<I> {
    pub fn new(bias: u64, initial_capacity: usize) -> Self {
        ConjugateIndex {
            bias,
            twins: RwLock::new((0..initial_capacity).map(|_| AtomicU64::new(UNPAIRED)).collect()),
            _id: PhantomData,
        }
    }

    fn slot(&self, id: I) -> Result<usize> {
        id.raw()
            .checked_sub(self.bias)
            .and_then(|s| usize::try_from(s).ok())
            .ok_or(GraphError::Stale {
                kind: I::KIND,
                id: id.raw(),
            })
    }
    fn ensure_slot(&self, slot: usize) {
        if slot < self.twins.read_recursive().len() {
            return;
        }
        let mut twins = self.twins.write();
        if slot >= twins.len() {
            let n = (slot + 1).max(twins.len() * 2);
            twins.resize_with(n, || AtomicU64::new(UNPAIRED));
        }
    }

    /// Install `a <-> b`; `pair(a, a)` marks `a` self-conjugate. Both sides must be unpaired.
    pub fn pair(&self, a: I, b: I) -> Result<()> {
        let (sa, sb) = (self.slot(a)?, self.slot(b)?);
        self.ensure_slot(sa.max(sb));
        let twins = self.twins.read_recursive();
        let broken = |x: I| {
            GraphError::invariant(
                format!("{} {x} is already paired", I::KIND),
                vec![a.raw(), b.raw()],
            )
        };
        twins[sa]
            .compare_exchange(UNPAIRED, b.raw(), Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| broken(a))?;
        if sa != sb
            && twins[sb]
                .compare_exchange(UNPAIRED, a.raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            twins[sa].store(UNPAIRED, Ordering::Release);
            return Err(broken(b));
        }
        Ok(())
    }
    pub fn twin(&self, a: I) -> Result<I> {
        let slot = self.slot(a)?;
        let twins = self.twins.read_recursive();
        match twins.get(slot).map(|t| t.load(Ordering::Acquire)) {
            Some(raw) if raw != UNPAIRED => Ok(I::from_raw(raw)),
            _ => Err(GraphError::Stale {
                kind: I::KIND,
                id: a.raw(),
            }),
        }
    }
    pub fn is_paired(&self, a: I) -> bool {
        self.twin(a).is_ok()
    }
    pub fn is_self_conjugate(&self, a: I) -> Result<bool> {
        Ok(self.twin(a)? == a)
    }
    /// Remove `a` and its twin from the index. A no-op if `a` is unpaired.
    pub fn unpair(&self, a: I) {
        let Ok(slot) = self.slot(a) else { return };
        let twins = self.twins.read_recursive();
        let Some(word) = twins.get(slot) else { return };
        let b = word.swap(UNPAIRED, Ordering::AcqRel);
        if b == UNPAIRED || b == a.raw() {
            return;
        }
        if let Some(other) = self.slot(I::from_raw(b)).ok().and_then(|s| twins.get(s)) {
            let _ = other.compare_exchange(a.raw(), UNPAIRED, Ordering::AcqRel, Ordering::Acquire);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EdgeId;

    fn e(raw: u64) -> EdgeId {
        EdgeId::from_raw(raw)
    }

    #[test]
    fn pairing_is_an_involution() {
        let idx = ConjugateIndex::new(8, 2);
        idx.pair(e(8), e(20)).unwrap();
        assert_eq!(idx.twin(e(8)).unwrap(), e(20));
        assert_eq!(idx.twin(idx.twin(e(20)).unwrap()).unwrap(), e(20));
        assert!(idx.pair(e(20), e(9)).is_err());
        assert!(!idx.is_paired(e(9)), "failed pair must not leave a half");
        idx.unpair(e(20));
        assert!(!idx.is_paired(e(8)));
        assert!(!idx.is_paired(e(20)));
        idx.unpair(e(20));
    }

    #[test]
    fn self_conjugate() {
        let idx = ConjugateIndex::new(0, 0);
        idx.pair(e(5), e(5)).unwrap();
        assert!(idx.is_self_conjugate(e(5)).unwrap());
        idx.unpair(e(5));
        assert!(matches!(idx.twin(e(5)), Err(GraphError::Stale { .. })));
        assert!(idx.twin(e(10_000)).is_err());
    }
}
