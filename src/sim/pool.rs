//! Fixed-capacity object pool
//!
//! Storage for every slot is allocated once in `setup`; `allocate` and `free`
//! only move indices on and off a free stack. Handles carry a generation so a
//! handle kept past `free` can never reach the slot's next occupant.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Objects that can live in a `Pool`
pub trait Poolable: Default {
    /// Reset every field to its default, dropping anything the previous
    /// occupant configured. Called at setup and again on every free.
    fn initialize(&mut self);
}

/// Generational handle to a pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    live: bool,
}

#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    /// Stack of free slot indices (top = next allocation)
    free: Vec<u32>,
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self::setup(0)
    }
}

impl<T: Poolable> Pool<T> {
    /// Allocate and pre-initialize `capacity` slots
    pub fn setup(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let mut value = T::default();
            value.initialize();
            slots.push(Slot {
                value,
                generation: 0,
                live: false,
            });
        }
        // Reversed so the lowest index is handed out first
        let free = (0..capacity as u32).rev().collect();
        Self { slots, free }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Claim an unused slot. Returns `None` when the pool is exhausted; the
    /// free list is left untouched in that case.
    pub fn allocate(&mut self) -> Option<(Handle, &mut T)> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.live, "free list referenced a live slot");
        slot.live = true;
        let handle = Handle {
            index,
            generation: slot.generation,
        };
        Some((handle, &mut slot.value))
    }

    /// Return a slot to the free list, resetting its contents
    pub fn free(&mut self, handle: Handle) -> SimResult<()> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .ok_or(SimError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            })?;
        if !slot.live {
            return Err(SimError::DoubleFree {
                index: handle.index,
            });
        }
        if slot.generation != handle.generation {
            return Err(SimError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            });
        }
        slot.value.initialize();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(())
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index())
            .filter(|s| s.live && s.generation == handle.generation)
            .map(|s| &s.value)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index())
            .filter(|s| s.live && s.generation == handle.generation)
            .map(|s| &mut s.value)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Handle of the live slot at `index`, if any. Lets callers walk the pool
    /// by index while mutating other parts of the world between visits.
    pub fn handle_at(&self, index: usize) -> Option<Handle> {
        self.slots.get(index).filter(|s| s.live).map(|s| Handle {
            index: index as u32,
            generation: s.generation,
        })
    }

    /// Live objects in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter(|(_, s)| s.live).map(|(i, s)| {
            (
                Handle {
                    index: i as u32,
                    generation: s.generation,
                },
                &s.value,
            )
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(|(_, s)| s.live)
            .map(|(i, s)| {
                (
                    Handle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    &mut s.value,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[derive(Debug, Default)]
    struct Probe {
        value: u32,
        initialized: u32,
    }

    impl Poolable for Probe {
        fn initialize(&mut self) {
            self.value = 0;
            self.initialized += 1;
        }
    }

    #[test]
    fn test_setup_pre_initializes() {
        let pool: Pool<Probe> = Pool::setup(4);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.free_count(), 4);
        assert!(pool.slots.iter().all(|s| s.value.initialized == 1));
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let mut pool: Pool<Probe> = Pool::setup(3);
        let mut handles = Vec::new();
        for i in 0..3 {
            let (h, probe) = pool.allocate().expect("capacity left");
            probe.value = i + 10;
            handles.push(h);
        }
        assert_eq!(pool.free_count(), 0);

        // capacity + 1 fails and leaves the earlier objects alone
        assert!(pool.allocate().is_none());
        assert_eq!(pool.free_count(), 0);
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(pool.get(*h).map(|p| p.value), Some(i as u32 + 10));
        }
    }

    #[test]
    fn test_free_resets_and_invalidates_handle() {
        let mut pool: Pool<Probe> = Pool::setup(1);
        let (h, probe) = pool.allocate().unwrap();
        probe.value = 99;
        pool.free(h).unwrap();

        let (h2, probe) = pool.allocate().unwrap();
        assert_eq!(probe.value, 0);
        assert_eq!(h.index(), h2.index());
        assert_ne!(h, h2);
        assert!(pool.get(h).is_none());
        assert!(pool.get(h2).is_some());
    }

    #[test]
    fn test_double_free_is_reported() {
        let mut pool: Pool<Probe> = Pool::setup(2);
        let (h, _) = pool.allocate().unwrap();
        pool.free(h).unwrap();
        assert_eq!(pool.free(h), Err(SimError::DoubleFree { index: 0 }));
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_stale_free_is_reported() {
        let mut pool: Pool<Probe> = Pool::setup(1);
        let (h, _) = pool.allocate().unwrap();
        pool.free(h).unwrap();
        let (_h2, _) = pool.allocate().unwrap();
        assert!(matches!(pool.free(h), Err(SimError::StaleHandle { .. })));
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn test_handle_at_and_iter_agree() {
        let mut pool: Pool<Probe> = Pool::setup(5);
        let a = pool.allocate().unwrap().0;
        let b = pool.allocate().unwrap().0;
        let c = pool.allocate().unwrap().0;
        pool.free(b).unwrap();

        let walked: Vec<Handle> = (0..pool.capacity()).filter_map(|i| pool.handle_at(i)).collect();
        let iterated: Vec<Handle> = pool.iter().map(|(h, _)| h).collect();
        assert_eq!(walked, vec![a, c]);
        assert_eq!(walked, iterated);
    }

    proptest! {
        #[test]
        fn prop_live_handles_never_alias(ops in proptest::collection::vec(any::<(bool, u8)>(), 0..200)) {
            let capacity = 16;
            let mut pool: Pool<Probe> = Pool::setup(capacity);
            let mut live: Vec<Handle> = Vec::new();
            let mut allocs = 0usize;
            let mut frees = 0usize;

            for (is_alloc, pick) in ops {
                if is_alloc {
                    let before = pool.free_count();
                    match pool.allocate() {
                        Some((h, _)) => {
                            live.push(h);
                            allocs += 1;
                        }
                        None => prop_assert_eq!(pool.free_count(), before),
                    }
                } else if !live.is_empty() {
                    let h = live.swap_remove(pick as usize % live.len());
                    prop_assert!(pool.free(h).is_ok());
                    frees += 1;
                }

                let slots: HashSet<usize> = live.iter().map(|h| h.index()).collect();
                prop_assert_eq!(slots.len(), live.len());
                prop_assert_eq!(pool.free_count(), capacity - allocs + frees);
            }
        }
    }
}
