//! Recycling arena that hands out stable handles instead of allocating.
//!
//! Instances are created lazily on underflow and are never dropped for the
//! lifetime of the pool. Every slot is either on the `available` stack or in
//! the dense `active` list; both moves are O(1).

use horde_core::EntityHandle;
use thiserror::Error;
use tracing::warn;

/// Error raised when a pooled instance cannot be returned to a clean state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("failed to reset pooled instance: {reason}")]
pub struct ResetError {
    reason: String,
}

impl ResetError {
    /// Creates a reset error carrying a human readable reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Reason supplied when the error was raised.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Values that can be recycled by a [`Pool`].
pub trait Reusable {
    /// Returns the value to the state it had when freshly constructed.
    fn reset(&mut self) -> Result<(), ResetError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Available,
    Active { position: usize },
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    state: SlotState,
    dirty: bool,
}

/// Growable pool of reusable instances addressed by [`EntityHandle`].
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    available: Vec<u32>,
    active: Vec<u32>,
}

impl<T: Reusable + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reusable + Default> Pool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a pool with `capacity` instances constructed up front.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(capacity),
            available: Vec::with_capacity(capacity),
            active: Vec::with_capacity(capacity),
        };
        for _ in 0..capacity {
            let index = pool.push_slot();
            pool.available.push(index);
        }
        pool
    }

    /// Moves an instance into the active set and returns its handle.
    ///
    /// A new instance is constructed only when no recycled one is available.
    pub fn acquire(&mut self) -> EntityHandle {
        let index = match self.available.pop() {
            Some(index) => index,
            None => self.push_slot(),
        };
        let position = self.active.len();
        let slot = &mut self.slots[index as usize];
        assert_eq!(
            slot.state,
            SlotState::Available,
            "slot {index} was on the available stack while active"
        );

        if slot.dirty {
            if let Err(error) = slot.value.reset() {
                warn!(%error, index, "reset retry failed, constructing a fresh instance");
                slot.value = T::default();
            }
            slot.dirty = false;
        }

        slot.state = SlotState::Active { position };
        let handle = EntityHandle::new(index, slot.generation);
        self.active.push(index);
        self.check_sizes();
        handle
    }

    /// Resets the instance and returns it to the available set.
    ///
    /// Releasing a handle that is not active (already released, stale, or
    /// never produced by this pool) is logged and ignored. Returns whether
    /// the call had any effect.
    pub fn release(&mut self, handle: EntityHandle) -> bool {
        let index = handle.index();
        let Some(slot) = self.slots.get(index as usize) else {
            warn!(?handle, "release of a handle this pool never issued");
            return false;
        };
        if slot.generation != handle.generation() {
            warn!(?handle, current = slot.generation, "release of a stale handle");
            return false;
        }
        let SlotState::Active { position } = slot.state else {
            warn!(?handle, "double release ignored");
            return false;
        };

        let removed = self.active.swap_remove(position);
        assert_eq!(removed, index, "active list out of sync with slot {index}");
        if let Some(&moved) = self.active.get(position) {
            self.slots[moved as usize].state = SlotState::Active { position };
        }

        self.retire(index);
        self.check_sizes();
        true
    }

    /// Releases every active instance, resetting each one.
    ///
    /// A failing reset still returns its instance to the available set.
    pub fn release_all(&mut self) -> usize {
        let mut active = std::mem::take(&mut self.active);
        let released = active.len();
        for &index in &active {
            self.retire(index);
        }
        active.clear();
        self.active = active;
        self.check_sizes();
        released
    }

    /// Reports whether the handle addresses a currently active instance.
    #[must_use]
    pub fn is_active(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Returns the active instance addressed by the handle.
    #[must_use]
    pub fn get(&self, handle: EntityHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        let live = slot.generation == handle.generation()
            && matches!(slot.state, SlotState::Active { .. });
        live.then_some(&slot.value)
    }

    /// Returns the active instance addressed by the handle mutably.
    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        let live = slot.generation == handle.generation()
            && matches!(slot.state, SlotState::Active { .. });
        live.then_some(&mut slot.value)
    }

    /// Handles of every active instance.
    pub fn handles(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.active.iter().map(move |&index| {
            EntityHandle::new(index, self.slots[index as usize].generation)
        })
    }

    /// Iterates over every active instance together with its handle.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &T)> + '_ {
        self.active.iter().map(move |&index| {
            let slot = &self.slots[index as usize];
            (EntityHandle::new(index, slot.generation), &slot.value)
        })
    }

    /// Number of active instances.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of instances waiting to be reused.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    /// Total number of instances ever constructed.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn push_slot(&mut self) -> u32 {
        let index = u32::try_from(self.slots.len()).expect("pool exceeded u32::MAX instances");
        self.slots.push(Slot {
            value: T::default(),
            generation: 0,
            state: SlotState::Available,
            dirty: false,
        });
        index
    }

    fn retire(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if let Err(error) = slot.value.reset() {
            warn!(%error, index, "reset failed on release, slot marked dirty");
            slot.dirty = true;
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.state = SlotState::Available;
        self.available.push(index);
    }

    fn check_sizes(&self) {
        debug_assert_eq!(
            self.active.len() + self.available.len(),
            self.slots.len(),
            "every instance must be either active or available"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    thread_local! {
        static RESETS: Cell<u32> = Cell::new(0);
    }

    #[derive(Debug, Default)]
    struct Probe {
        value: u32,
        fail_next_reset: bool,
    }

    impl Reusable for Probe {
        fn reset(&mut self) -> Result<(), ResetError> {
            RESETS.with(|resets| resets.set(resets.get() + 1));
            if std::mem::take(&mut self.fail_next_reset) {
                return Err(ResetError::new("probe refused"));
            }
            self.value = 0;
            Ok(())
        }
    }

    fn resets() -> u32 {
        RESETS.with(Cell::get)
    }

    #[test]
    fn acquire_grows_only_on_underflow() {
        let mut pool: Pool<Probe> = Pool::new();
        let first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(pool.capacity(), 2);

        assert!(pool.release(first));
        let third = pool.acquire();
        assert_eq!(pool.capacity(), 2, "released slot must be reused");
        assert_eq!(third.index(), first.index());
        assert_ne!(third.generation(), first.generation());
        assert!(pool.is_active(second));
    }

    #[test]
    fn double_release_resets_once() {
        let mut pool: Pool<Probe> = Pool::new();
        let handle = pool.acquire();
        let before = resets();

        assert!(pool.release(handle));
        assert!(!pool.release(handle));

        assert_eq!(resets() - before, 1);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn foreign_and_stale_handles_are_ignored() {
        let mut pool: Pool<Probe> = Pool::new();
        let handle = pool.acquire();
        assert!(!pool.release(EntityHandle::new(99, 0)));
        assert!(!pool.release(EntityHandle::new(handle.index(), handle.generation() + 1)));
        assert!(pool.is_active(handle));
    }

    #[test]
    fn release_all_survives_failing_reset() {
        let mut pool: Pool<Probe> = Pool::new();
        let handles: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        if let Some(probe) = pool.get_mut(handles[2]) {
            probe.value = 7;
            probe.fail_next_reset = true;
        }

        assert_eq!(pool.release_all(), 4);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.available_count(), 4);

        let reacquired: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        assert_eq!(pool.capacity(), 4);
        for handle in reacquired {
            assert_eq!(pool.get(handle).map(|probe| probe.value), Some(0));
        }
    }

    #[test]
    fn released_instances_are_not_reachable() {
        let mut pool: Pool<Probe> = Pool::new();
        let handle = pool.acquire();
        assert!(pool.release(handle));
        assert!(pool.get(handle).is_none());
        assert_eq!(pool.handles().count(), 0);
    }

    #[test]
    fn membership_total_never_shrinks() {
        let mut pool: Pool<Probe> = Pool::with_capacity(3);
        let mut live = Vec::new();
        let mut created = pool.capacity();
        for step in 0..200_u32 {
            if step % 3 == 2 && !live.is_empty() {
                let handle = live.swap_remove((step as usize * 7) % live.len());
                assert!(pool.release(handle));
            } else {
                live.push(pool.acquire());
            }
            assert_eq!(pool.active_count() + pool.available_count(), pool.capacity());
            assert!(pool.capacity() >= created);
            created = pool.capacity();
        }
        assert_eq!(pool.active_count(), live.len());
    }
}
