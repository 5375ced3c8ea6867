//! Cache Store Module
//!
//! Main cache engine combining a storage engine with TTL expiration.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::cache::{CacheCounters, CacheStats};
use crate::error::{CacheError, Result};
use crate::storage::{ClassOccupancy, Storage};

#[derive(Debug)]
struct CacheInner {
    storage: Storage,
    expirations: HashMap<Vec<u8>, Instant>,
}

impl CacheInner {
    fn is_live(&self, key: &[u8], now: Instant) -> bool {
        self.expirations
            .get(key)
            .is_some_and(|&expires_at| now < expires_at)
    }
}

// == Cache ==
/// TTL cache over a storage engine.
///
/// A key is present only while it exists in storage and `now < expires_at`.
/// Expired entries read as absent immediately; their bytes are reclaimed by
/// the next sweep. Reads take the shared lock, writes and sweeps the
/// exclusive one.
#[derive(Debug)]
pub struct Cache {
    inner: RwLock<CacheInner>,
    counters: CacheCounters,
}

impl Cache {
    // == Constructor ==
    pub fn new(storage: Storage) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                storage,
                expirations: HashMap::new(),
            }),
            counters: CacheCounters::new(),
        }
    }

    /// Creates a cache over unbounded storage.
    pub fn unbounded() -> Self {
        Self::new(Storage::unbounded())
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl`.
    ///
    /// A zero `ttl` still writes the value, but it is never readable. When
    /// storage rejects the write, the expiry is left untouched.
    pub async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()> {
        let mut inner = self.inner.write().await;

        inner.storage.put(key, value)?;
        let expires_at = Instant::now() + ttl;
        inner.expirations.insert(key.to_vec(), expires_at);

        Ok(())
    }

    // == Get ==
    /// Returns the value for `key` if it is stored and not expired.
    pub async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;

        let value = inner
            .is_live(key, Instant::now())
            .then(|| inner.storage.get(key))
            .flatten();

        match value {
            Some(value) => {
                self.counters.record_hit();
                Ok(value.to_vec())
            }
            None => {
                self.counters.record_miss();
                Err(CacheError::KeyNotFound(
                    String::from_utf8_lossy(key).into_owned(),
                ))
            }
        }
    }

    // == Has ==
    pub async fn has(&self, key: &[u8]) -> bool {
        let inner = self.inner.read().await;
        inner.is_live(key, Instant::now()) && inner.storage.get(key).is_some()
    }

    // == Delete ==
    /// Removes `key`. Deleting an absent key is not an error.
    ///
    /// Returns whether storage held the key.
    pub async fn delete(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.write().await;
        inner.expirations.remove(key);
        inner.storage.remove(key)
    }

    // == Show ==
    /// Human-readable dump of every stored entry, one per line.
    pub async fn show(&self) -> String {
        let inner = self.inner.read().await;
        let now = Instant::now();

        let mut keys: Vec<&Vec<u8>> = inner.expirations.keys().collect();
        keys.sort();

        let mut out = String::new();
        for key in keys {
            let Some(value) = inner.storage.get(key) else {
                continue;
            };
            let expires_at = inner.expirations[key];
            let state = if now < expires_at {
                format!("expires in {}ms", (expires_at - now).as_millis())
            } else {
                "expired".to_string()
            };
            let _ = writeln!(
                out,
                "{} => {} ({})",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value),
                state
            );
        }

        if out.is_empty() {
            out.push_str("(empty)");
        }
        out
    }

    // == Sweep Expired ==
    /// Physically removes every expired entry.
    ///
    /// Returns the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let now = Instant::now();

        let expired: Vec<Vec<u8>> = inner
            .expirations
            .iter()
            .filter(|(_, expires_at)| now >= **expires_at)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.expirations.remove(key);
            inner.storage.remove(key);
        }

        self.counters.record_swept(expired.len());
        expired.len()
    }

    // == Length ==
    /// Entries held by storage, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.storage.size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        self.counters
            .snapshot(inner.storage.size(), inner.storage.capacity())
    }

    pub async fn occupancy(&self) -> Vec<ClassOccupancy> {
        self.inner.read().await.storage.occupancy()
    }
}
