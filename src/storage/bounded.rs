//! Bounded Storage Module
//!
//! A fixed-size byte arena split into size classes. Each class owns
//! `capacity` slots laid out as `[length byte][size bytes of payload]`.

use std::collections::BTreeMap;

use super::slots::SlotMap;
use super::ClassOccupancy;
use crate::error::StorageError;

/// Largest payload a slot can describe with its one-byte length prefix.
pub const MAX_SLOT_PAYLOAD: usize = u8::MAX as usize;

#[derive(Debug)]
struct SizeClass {
    /// Payload bytes per slot, excluding the length byte
    size: usize,
    slots: SlotMap,
}

impl SizeClass {
    fn slot_len(&self) -> usize {
        self.size + 1
    }

    fn fits(&self, value_len: usize) -> bool {
        value_len + 1 <= self.slot_len()
    }
}

// == Bounded Storage ==
/// Pre-allocated, size-classed storage.
///
/// A key lives in exactly one class at a time. Values go to the smallest
/// class that fits them; there is no fallback to a larger class when that
/// one is full.
#[derive(Debug)]
pub struct BoundedStorage {
    /// Sorted by ascending `size`
    classes: Vec<SizeClass>,
    data: Vec<u8>,
    capacity: usize,
}

impl BoundedStorage {
    // == Constructor ==
    /// Builds the arena from `(value size, slot count)` pairs.
    ///
    /// Pairs with a zero size or zero count are ignored. Duplicate sizes keep
    /// the last count given.
    pub fn new<I>(layout: I) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let layout: BTreeMap<usize, usize> = layout
            .into_iter()
            .filter(|&(size, capacity)| size > 0 && capacity > 0)
            .collect();

        if layout.is_empty() {
            return Err(StorageError::InvalidLayout(
                "at least one non-empty size class is required".to_string(),
            ));
        }

        if let Some((&size, _)) = layout.iter().next_back() {
            if size > MAX_SLOT_PAYLOAD {
                return Err(StorageError::InvalidLayout(format!(
                    "size class {} exceeds the {} byte slot limit",
                    size, MAX_SLOT_PAYLOAD
                )));
            }
        }

        let mut classes = Vec::with_capacity(layout.len());
        let mut next_offset = 0;
        let mut total_capacity = 0;

        for (size, capacity) in layout {
            let slot_len = size + 1;
            let offsets = (0..capacity).map(|i| next_offset + i * slot_len).collect();
            next_offset += capacity * slot_len;
            total_capacity += capacity;

            classes.push(SizeClass {
                size,
                slots: SlotMap::new(offsets),
            });
        }

        Ok(Self {
            classes,
            data: vec![0; next_offset],
            capacity: total_capacity,
        })
    }

    // == Put ==
    /// Stores `value` under `key`.
    ///
    /// If the key moves to a different class, its old slot is freed only
    /// after the new one has been claimed, so a failed put leaves the
    /// previous value readable.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let target = self
            .classes
            .iter()
            .position(|class| class.fits(value.len()))
            .ok_or(StorageError::NoFittingClass(value.len()))?;
        let previous = self.class_index(key);

        let class = &mut self.classes[target];
        let offset = class
            .slots
            .occupy(key)
            .ok_or(StorageError::Full(class.size))?;

        self.data[offset] = value.len() as u8;
        self.data[offset + 1..offset + 1 + value.len()].copy_from_slice(value);

        if let Some(previous) = previous.filter(|&p| p != target) {
            self.classes[previous].slots.free(key);
        }

        Ok(())
    }

    // == Get ==
    /// Looks the key up in every class, `O(number of classes)`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let offset = self.classes.iter().find_map(|class| class.slots.get(key))?;
        let len = self.data[offset] as usize;
        Some(&self.data[offset + 1..offset + 1 + len])
    }

    // == Remove ==
    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.class_index(key) {
            Some(index) => self.classes[index].slots.free(key),
            None => false,
        }
    }

    /// Number of occupied slots across all classes.
    pub fn size(&self) -> usize {
        self.classes.iter().map(|class| class.slots.len()).sum()
    }

    /// Total number of slots across all classes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the class currently holding `key`.
    pub fn class_of(&self, key: &[u8]) -> Option<usize> {
        self.class_index(key).map(|index| self.classes[index].size)
    }

    pub fn occupancy(&self) -> Vec<ClassOccupancy> {
        self.classes
            .iter()
            .map(|class| ClassOccupancy {
                size: class.size,
                used: class.slots.len(),
                capacity: class.slots.capacity(),
            })
            .collect()
    }

    /// Number of classes holding `key`; never more than one.
    #[cfg(test)]
    pub(crate) fn classes_holding(&self, key: &[u8]) -> usize {
        self.classes
            .iter()
            .filter(|class| class.slots.get(key).is_some())
            .count()
    }

    fn class_index(&self, key: &[u8]) -> Option<usize> {
        self.classes
            .iter()
            .position(|class| class.slots.get(key).is_some())
    }
}
