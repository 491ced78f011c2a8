//! Fixed-capacity slot arena for setup-time registries
//!
//! Slots are filled front to back and never freed, so slot order is
//! registration order.

/// One slot of a [`SlotArena`]
#[derive(Debug)]
pub enum Slot<T> {
    Free,
    Used(T),
}

/// Bounded table of entries addressed by slot index
#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Box<[Slot<T>]>,
}

impl<T> SlotArena<T> {
    /// Create an arena with `capacity` free slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::Free).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of used slots
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|slot| matches!(slot, Slot::Used(_)))
    }

    /// Store `value` in the first free slot, returning its index.
    /// Hands the value back when every slot is used.
    pub fn insert(&mut self, value: T) -> Result<usize, T> {
        match self.slots.iter().position(|slot| matches!(slot, Slot::Free)) {
            Some(index) => {
                self.slots[index] = Slot::Used(value);
                Ok(index)
            }
            None => Err(value),
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        match self.slots.get(index) {
            Some(Slot::Used(value)) => Some(value),
            _ => None,
        }
    }

    /// Used slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Used(value) => Some((index, value)),
            Slot::Free => None,
        })
    }

    /// First used slot matching `predicate`
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<(usize, &T)> {
        self.iter().find(|(_, value)| predicate(value))
    }
}
