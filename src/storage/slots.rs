//! Slot bookkeeping for one bounded size class.

use std::collections::HashMap;

// == Slot Map ==
/// Tracks which key occupies which slot offset of a size class.
///
/// Free offsets are handed out lowest first.
#[derive(Debug)]
pub(crate) struct SlotMap {
    free: Vec<usize>,
    occupied: HashMap<Vec<u8>, usize>,
    capacity: usize,
}

impl SlotMap {
    pub(crate) fn new(offsets: Vec<usize>) -> Self {
        let capacity = offsets.len();
        let mut free = offsets;
        free.reverse();

        Self {
            free,
            occupied: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<usize> {
        self.occupied.get(key).copied()
    }

    /// Claims a slot for `key`. A key that already holds a slot keeps it.
    ///
    /// Returns `None` when the class is full.
    pub(crate) fn occupy(&mut self, key: &[u8]) -> Option<usize> {
        if let Some(offset) = self.get(key) {
            return Some(offset);
        }

        let offset = self.free.pop()?;
        self.occupied.insert(key.to_vec(), offset);
        Some(offset)
    }

    /// Releases the slot held by `key`.
    pub(crate) fn free(&mut self, key: &[u8]) -> bool {
        match self.occupied.remove(key) {
            Some(offset) => {
                self.free.push(offset);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.occupied.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
