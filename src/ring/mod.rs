//! Consistent Hash Ring Module
//!
//! Maps keys onto a dynamic set of nodes. Each node is hashed into a number
//! of virtual positions; a key belongs to the first position at or after its
//! own hash, wrapping around to the start of the ring.

#[cfg(test)]
mod property_tests;

use std::collections::HashMap;
use std::hash::Hasher;

use twox_hash::XxHash64;

/// Virtual positions per node, and the floor for custom counts.
pub const DEFAULT_REPLICAS: usize = 100;

/// Weight that maps to the full replica count.
pub const TOP_WEIGHT: usize = 100;

// Prefix for the secondary hash that picks among colliding nodes
const COLLISION_PREFIX: &[u8] = b"16777619:";

// == Consistent Hash Ring ==
#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    replicas: usize,
    /// Sorted virtual positions; a hash repeats once per colliding node
    keys: Vec<u64>,
    ring: HashMap<u64, Vec<String>>,
    /// Node -> number of virtual positions it registered
    nodes: HashMap<String, usize>,
}

impl Default for ConsistentHashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistentHashRing {
    // == Constructors ==
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    /// Creates a ring with `replicas` virtual positions per node, raised to
    /// `DEFAULT_REPLICAS` if lower.
    pub fn with_replicas(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(DEFAULT_REPLICAS),
            keys: Vec::new(),
            ring: HashMap::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    // == Add ==
    /// Registers `node` with the full replica count, replacing any earlier
    /// registration.
    pub fn add(&mut self, node: &str) {
        self.add_with_replicas(node, self.replicas);
    }

    /// Registers `node` with `replicas` positions, clamped between one and
    /// the ring's replica count.
    pub fn add_with_replicas(&mut self, node: &str, replicas: usize) {
        self.remove(node);

        let replicas = replicas.clamp(1, self.replicas);
        for i in 0..replicas {
            let hash = virtual_position(node, i);
            self.keys.push(hash);
            self.ring.entry(hash).or_default().push(node.to_string());
        }
        self.keys.sort_unstable();
        self.nodes.insert(node.to_string(), replicas);
    }

    /// Registers `node` with a share of the replica count, `weight` being a
    /// percentage clamped between 1 and `TOP_WEIGHT`.
    pub fn add_with_weight(&mut self, node: &str, weight: usize) {
        let weight = weight.clamp(1, TOP_WEIGHT);
        let replicas = self.replicas * weight / TOP_WEIGHT;
        self.add_with_replicas(node, replicas);
    }

    // == Get ==
    /// Returns the node owning `key`, or `None` when the ring is empty.
    pub fn get<K>(&self, key: &K) -> Option<&str>
    where
        K: AsRef<[u8]> + ?Sized,
    {
        if self.keys.is_empty() {
            return None;
        }

        let key = key.as_ref();
        let hash = hash(key);
        let index = self.keys.partition_point(|&k| k < hash) % self.keys.len();

        let owners = self.ring.get(&self.keys[index])?;
        match owners.len() {
            0 => None,
            1 => Some(owners[0].as_str()),
            n => {
                let mut repr = COLLISION_PREFIX.to_vec();
                repr.extend_from_slice(key);
                let pos = (self::hash(&repr) % n as u64) as usize;
                Some(owners[pos].as_str())
            }
        }
    }

    // == Remove ==
    /// Drops every virtual position of `node`. Unknown nodes are ignored.
    pub fn remove(&mut self, node: &str) {
        let Some(replicas) = self.nodes.remove(node) else {
            return;
        };

        for i in 0..replicas {
            let hash = virtual_position(node, i);
            if let Ok(index) = self.keys.binary_search(&hash) {
                self.keys.remove(index);
            }
            if let Some(owners) = self.ring.get_mut(&hash) {
                owners.retain(|owner| owner != node);
                if owners.is_empty() {
                    self.ring.remove(&hash);
                }
            }
        }
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Registered nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn virtual_position(node: &str, index: usize) -> u64 {
    hash(format!("{node}{index}").as_bytes())
}

fn hash(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}
