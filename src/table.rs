// Roel Kluin, 2023, GPL v3

use crate::error::{GraphError, Result};
use crate::id_distributor::IdDistributor;
use crate::ids::EntityId;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::marker::PhantomData;
use tracing::debug;

/// Records keyed by dense ids, one mutex per slot.
///
/// The slot vector only grows, under its write lock, and always before the distributor hands
/// out the new ids. Everything else reads it with `read_recursive`, so a thread that holds
/// slot guards can still look up other records.
pub struct EntityTable<I: EntityId, R> {
    ids: IdDistributor,
    slots: RwLock<Vec<Mutex<Slot<R>>>>,
    max_capacity: usize,
    _id: PhantomData<I>,
}

/// A record, and whether a committed deletion is about to drop it. A retiring record stays
/// readable for observers but can no longer be locked for change.
struct Slot<R> {
    record: Option<R>,
    retiring: bool,
}

impl<R> Default for Slot<R> {
    fn default() -> Self {
        Slot {
            record: None,
            retiring: false,
        }
    }
}

impl<R> Slot<R> {
    fn live(&self) -> Option<&R> {
        self.record.as_ref().filter(|_| !self.retiring)
    }
    fn live_mut(&mut self) -> Option<&mut R> {
        if self.retiring {
            return None;
        }
        self.record.as_mut()
    }
}

/// Slot guards held by `EntityTable::with_locked`, in ascending id order.
pub struct Locked<'a, I, R> {
    guards: Vec<(I, MutexGuard<'a, Slot<R>>)>,
}

impl<I: EntityId, R> EntityTable<I, R> {
    pub fn new(bias: u64, initial_capacity: usize, max_capacity: usize) -> Self {
        let initial_capacity = initial_capacity.min(max_capacity);
        EntityTable {
            ids: IdDistributor::new(bias, initial_capacity),
            slots: RwLock::new((0..initial_capacity).map(|_| Mutex::default()).collect()),
            max_capacity,
            _id: PhantomData,
        }
    }
    pub fn bias(&self) -> u64 {
        self.ids.bias()
    }
    pub fn capacity(&self) -> usize {
        self.ids.size()
    }
    /// Occupied ids, including ones reserved by a mutation in flight.
    pub fn len(&self) -> usize {
        self.ids.occupied_count()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// `id - bias`, for indexing dense vectors.
    pub fn slot_of(&self, id: I) -> Option<usize> {
        self.ids.slot(id.raw())
    }
    pub fn contains(&self, id: I) -> bool {
        self.read(id, |_| ()).is_ok()
    }
    /// Ids with an installed record, ascending. Not concurrently with any mutation: the
    /// iterator holds the distributor's read guard, so a table growing on another thread
    /// deadlocks against it, and a mutation on this thread does too. Collect first.
    pub fn live_ids(&self) -> impl Iterator<Item = I> + '_ {
        self.ids
            .ids()
            .map(I::from_raw)
            .filter(move |&id| self.contains(id))
    }
    pub(crate) fn distributor(&self) -> &IdDistributor {
        &self.ids
    }

    fn stale(id: I) -> GraphError {
        GraphError::Stale {
            kind: I::KIND,
            id: id.raw(),
        }
    }

    pub fn read<T>(&self, id: I, f: impl FnOnce(&R) -> T) -> Result<T> {
        let slots = self.slots.read_recursive();
        let slot = self.slot_of(id).ok_or_else(|| Self::stale(id))?;
        let guard = slots[slot].lock();
        guard.record.as_ref().map(f).ok_or_else(|| Self::stale(id))
    }
    pub fn at(&self, id: I) -> Result<R>
    where
        R: Clone,
    {
        self.read(id, R::clone)
    }
    pub fn update<T>(&self, id: I, f: impl FnOnce(&mut R) -> T) -> Result<T> {
        let slots = self.slots.read_recursive();
        let slot = self.slot_of(id).ok_or_else(|| Self::stale(id))?;
        let mut guard = slots[slot].lock();
        guard.live_mut().map(f).ok_or_else(|| Self::stale(id))
    }

    /// Grow slots and ids to at least `min_len`, doubling. `observed` is the capacity the
    /// caller saw; if another thread has grown past it meanwhile there is nothing to do.
    fn grow(&self, observed: usize, min_len: usize) -> Result<()> {
        let mut slots = self.slots.write();
        if slots.len() > observed && slots.len() >= min_len {
            return Ok(());
        }
        let target = (observed * 2).max(min_len).max(1).min(self.max_capacity);
        if target < min_len || target <= observed {
            return Err(GraphError::Exhausted {
                bias: self.bias(),
                capacity: observed,
            });
        }
        debug!(kind = I::KIND, from = observed, to = target, "growing table");
        slots.resize_with(target, Mutex::default);
        self.ids.resize(target);
        Ok(())
    }

    /// Allocate an id, growing the table when the distributor runs dry.
    pub(crate) fn reserve(&self) -> Result<I> {
        loop {
            let observed = self.capacity();
            match self.ids.allocate(0) {
                Ok(raw) => return Ok(I::from_raw(raw)),
                Err(e) if e.is_exhausted() => self.grow(observed, observed + 1)?,
                Err(e) => return Err(e),
            }
        }
    }
    /// Occupy a predetermined id.
    pub(crate) fn reserve_at(&self, id: I) -> Result<()> {
        let slot = id
            .raw()
            .checked_sub(self.bias())
            .and_then(|s| usize::try_from(s).ok())
            .ok_or_else(|| {
                GraphError::PreconditionViolated(format!("{id} is below bias {}", self.bias()))
            })?;
        let observed = self.capacity();
        if slot >= observed {
            self.grow(observed, slot + 1)?;
        }
        self.ids.acquire(id.raw())
    }
    pub(crate) fn install(&self, id: I, record: R) -> Result<()> {
        let slots = self.slots.read_recursive();
        let slot = self.slot_of(id).ok_or_else(|| Self::stale(id))?;
        let mut guard = slots[slot].lock();
        if guard.record.is_some() {
            return Err(GraphError::invariant(
                format!("{} slot already holds a record", I::KIND),
                vec![id.raw()],
            ));
        }
        *guard = Slot {
            record: Some(record),
            retiring: false,
        };
        Ok(())
    }
    pub(crate) fn take(&self, id: I) -> Result<R> {
        let slots = self.slots.read_recursive();
        let slot = self.slot_of(id).ok_or_else(|| Self::stale(id))?;
        let taken = std::mem::take(&mut *slots[slot].lock()).record;
        taken.ok_or_else(|| Self::stale(id))
    }
    /// Mark a live record as about to be deleted. Call it while holding the locks that
    /// guard every writer of `id`.
    pub(crate) fn retire(&self, id: I) -> Result<()> {
        let slots = self.slots.read_recursive();
        let slot = self.slot_of(id).ok_or_else(|| Self::stale(id))?;
        let mut guard = slots[slot].lock();
        if guard.live().is_none() {
            return Err(Self::stale(id));
        }
        guard.retiring = true;
        Ok(())
    }
    /// Undo `retire` of a mutation that did not take effect.
    pub(crate) fn unretire(&self, id: I) {
        let slots = self.slots.read_recursive();
        if let Some(slot) = self.slot_of(id) {
            slots[slot].lock().retiring = false;
        }
    }
    pub fn is_retiring(&self, id: I) -> bool {
        let slots = self.slots.read_recursive();
        self.slot_of(id)
            .map_or(false, |slot| slots[slot].lock().retiring)
    }
    pub(crate) fn release(&self, id: I) {
        self.ids.release(id.raw())
    }

    /// Run `f` holding the slot guards of `ids`, taken in ascending order.
    pub(crate) fn with_locked<T>(
        &self,
        ids: &[I],
        f: impl FnOnce(&mut Locked<'_, I, R>) -> Result<T>,
    ) -> Result<T> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let slots = self.slots.read_recursive();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let slot = self.slot_of(id).ok_or_else(|| Self::stale(id))?;
            guards.push((id, slots[slot].lock()));
        }
        // the guards borrow `slots`, which must outlive them
        #[allow(clippy::let_and_return)]
        let result = f(&mut Locked { guards });
        result
    }

    /// Install `record` under a fresh id, then report it to `on_added`.
    pub fn create(&self, record: R, on_added: impl FnOnce(I) -> Result<()>) -> Result<I> {
        let id = self.reserve()?;
        if let Err(e) = self.install(id, record) {
            self.release(id);
            return Err(e);
        }
        on_added(id)?;
        Ok(id)
    }
    /// Report `id` to `on_deleting` while its record is still readable, then drop the record
    /// and free the id.
    pub fn erase(&self, id: I, on_deleting: impl FnOnce(I) -> Result<()>) -> Result<R> {
        if !self.contains(id) {
            return Err(Self::stale(id));
        }
        on_deleting(id)?;
        let record = self.take(id)?;
        self.release(id);
        Ok(record)
    }
}

impl<'a, I: EntityId, R> Locked<'a, I, R> {
    fn position(&self, id: I) -> Result<usize> {
        self.guards
            .binary_search_by(|(locked, _)| locked.cmp(&id))
            .map_err(|_| {
                GraphError::invariant(format!("{} {id} is not locked", I::KIND), vec![id.raw()])
            })
    }
    /// The record of `id`; `Stale` once it is gone or retiring.
    pub fn get(&self, id: I) -> Result<&R> {
        let i = self.position(id)?;
        self.guards[i].1.live().ok_or(GraphError::Stale {
            kind: I::KIND,
            id: id.raw(),
        })
    }
    pub fn get_mut(&mut self, id: I) -> Result<&mut R> {
        let i = self.position(id)?;
        self.guards[i].1.live_mut().ok_or(GraphError::Stale {
            kind: I::KIND,
            id: id.raw(),
        })
    }
    pub(crate) fn retire(&mut self, id: I) -> Result<()> {
        self.get(id)?;
        let i = self.position(id)?;
        self.guards[i].1.retiring = true;
        Ok(())
    }
    pub(crate) fn unretire(&mut self, id: I) {
        if let Ok(i) = self.position(id) {
            self.guards[i].1.retiring = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::VertexId;
    use std::cell::Cell;

    type Table = EntityTable<VertexId, String>;

    #[test]
    fn create_read_erase() {
        let t = Table::new(100, 2, 16);
        let added = Cell::new(None);
        let a = t.create("a".into(), |id| {
            added.set(Some(id));
            Ok(())
        });
        let a = a.unwrap();
        assert_eq!(added.get(), Some(a));
        assert_eq!(a.raw(), 100);
        assert_eq!(t.at(a).unwrap(), "a");
        assert_eq!(t.slot_of(a), Some(0));

        let seen = Cell::new(false);
        let gone = t
            .erase(a, |id| {
                // still readable while observers run
                assert_eq!(t.at(id).unwrap(), "a");
                seen.set(true);
                Ok(())
            })
            .unwrap();
        assert!(seen.get());
        assert_eq!(gone, "a");
        assert!(matches!(t.at(a), Err(GraphError::Stale { .. })));
        assert!(t.erase(a, |_| Ok(())).is_err());
    }

    #[test]
    fn grows_until_max_capacity() {
        let t = Table::new(0, 1, 4);
        let ids: Vec<_> = (0..4)
            .map(|i| t.create(i.to_string(), |_| Ok(())).unwrap())
            .collect();
        assert_eq!(t.capacity(), 4);
        assert_eq!(t.live_ids().collect::<Vec<_>>(), ids);
        assert!(t.reserve().unwrap_err().is_exhausted());
    }

    #[test]
    fn reserve_at_grows_to_fit() {
        let t = Table::new(10, 2, 1 << 10);
        let id = VertexId::from_raw(10 + 37);
        t.reserve_at(id).unwrap();
        t.install(id, "x".into()).unwrap();
        assert!(t.capacity() > 37);
        assert!(t.reserve_at(id).is_err());
        assert!(t.reserve_at(VertexId::from_raw(3)).is_err());
        assert_eq!(t.live_ids().collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn reserved_ids_are_not_live() {
        let t = Table::new(0, 4, 4);
        let id = t.reserve().unwrap();
        assert_eq!(t.len(), 1);
        assert!(!t.contains(id));
        assert_eq!(t.live_ids().count(), 0);
        t.release(id);
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn locked_records_are_mutable() {
        let t = Table::new(0, 4, 4);
        let a = t.create("a".into(), |_| Ok(())).unwrap();
        let b = t.create("b".into(), |_| Ok(())).unwrap();
        let free = t.reserve().unwrap();
        t.with_locked(&[b, a, b], |locked| {
            locked.get_mut(a)?.push('!');
            assert_eq!(locked.get(b)?, "b");
            assert!(locked.get(free).is_err());
            Ok(())
        })
        .unwrap();
        t.with_locked(&[free], |locked| {
            assert!(matches!(locked.get(free), Err(GraphError::Stale { .. })));
            Ok(())
        })
        .unwrap();
        assert_eq!(t.at(a).unwrap(), "a!");
    }

    #[test]
    fn retiring_records_are_read_only() {
        let t = Table::new(0, 4, 4);
        let a = t.create("a".into(), |_| Ok(())).unwrap();
        let b = t.create("b".into(), |_| Ok(())).unwrap();
        t.with_locked(&[a], |locked| locked.retire(a)).unwrap();
        t.retire(b).unwrap();
        assert!(t.is_retiring(a) && t.is_retiring(b));
        // observers still see the record
        assert_eq!(t.at(a).unwrap(), "a");
        assert!(t.contains(a));
        assert!(t.retire(a).is_err());
        assert!(matches!(t.update(a, |r| r.push('!')), Err(GraphError::Stale { .. })));
        let locked = t.with_locked(&[a, b], |locked| {
            assert!(matches!(locked.get(a), Err(GraphError::Stale { .. })));
            assert!(matches!(locked.get_mut(b), Err(GraphError::Stale { .. })));
            Ok(())
        });
        assert!(locked.is_ok());

        t.unretire(b);
        assert_eq!(t.update(b, |r| r.len()).unwrap(), 1);
        assert_eq!(t.take(a).unwrap(), "a");
        t.release(a);
        assert!(!t.is_retiring(a));
        let c = t.create("c".into(), |_| Ok(())).unwrap();
        t.with_locked(&[c], |locked| locked.get_mut(c).map(|r| r.push('!')))
            .unwrap();
    }
}
