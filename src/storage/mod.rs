//! Storage Module
//!
//! Raw key -> value storage engines. Engines know nothing about TTLs or
//! networking; the cache layers expiry on top.

mod bounded;
mod slots;
mod unbounded;


pub use bounded::BoundedStorage;
pub use unbounded::UnboundedStorage;

use serde::Serialize;

use crate::error::StorageError;

// == Class Occupancy ==
/// Usage of one bounded size class, reported by the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassOccupancy {
    /// Largest value (in bytes) a slot of this class holds
    pub size: usize,
    /// Occupied slots
    pub used: usize,
    /// Total slots
    pub capacity: usize,
}

// == Storage ==
/// A storage engine, either an unbounded map or a fixed-capacity arena.
#[derive(Debug)]
pub enum Storage {
    Unbounded(UnboundedStorage),
    Bounded(BoundedStorage),
}

impl Storage {
    /// Creates an unbounded, map-backed storage.
    pub fn unbounded() -> Self {
        Storage::Unbounded(UnboundedStorage::new())
    }

    /// Creates a bounded storage from `(value size, slot count)` pairs.
    ///
    /// All memory is allocated here and never grows afterwards.
    pub fn bounded<I>(layout: I) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        Ok(Storage::Bounded(BoundedStorage::new(layout)?))
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        match self {
            Storage::Unbounded(s) => {
                s.put(key, value);
                Ok(())
            }
            Storage::Bounded(s) => s.put(key, value),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self {
            Storage::Unbounded(s) => s.get(key),
            Storage::Bounded(s) => s.get(key),
        }
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self {
            Storage::Unbounded(s) => s.remove(key),
            Storage::Bounded(s) => s.remove(key),
        }
    }

    /// Number of stored keys.
    pub fn size(&self) -> usize {
        match self {
            Storage::Unbounded(s) => s.size(),
            Storage::Bounded(s) => s.size(),
        }
    }

    /// Total slot count, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Storage::Unbounded(_) => None,
            Storage::Bounded(s) => Some(s.capacity()),
        }
    }

    /// Per-class usage, empty when unbounded.
    pub fn occupancy(&self) -> Vec<ClassOccupancy> {
        match self {
            Storage::Unbounded(_) => Vec::new(),
            Storage::Bounded(s) => s.occupancy(),
        }
    }
}
