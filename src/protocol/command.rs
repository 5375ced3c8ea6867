//! Command Module
//!
//! The five commands a peer can send and how each one runs against a cache.

use std::fmt;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::CacheError;
use crate::protocol::{RESPONSE_DELETED, RESPONSE_FALSE, RESPONSE_OK, RESPONSE_TRUE};

// == Command ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store `value` under `key` for `ttl_ms` milliseconds
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        ttl_ms: u32,
    },
    Get {
        key: Vec<u8>,
    },
    Has {
        key: Vec<u8>,
    },
    Delete {
        key: Vec<u8>,
    },
    /// Debug dump of every stored entry
    Show,
}

impl Command {
    pub fn set(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Command::Set {
            key: key.into(),
            value: value.into(),
            ttl_ms: u32::try_from(ttl.as_millis()).unwrap_or(u32::MAX),
        }
    }

    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Command::Get { key: key.into() }
    }

    pub fn has(key: impl Into<Vec<u8>>) -> Self {
        Command::Has { key: key.into() }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Command::Delete { key: key.into() }
    }

    /// True for commands a leader forwards to its followers.
    pub fn modifies_cache(&self) -> bool {
        matches!(self, Command::Set { .. } | Command::Delete { .. })
    }

    // == Execute ==
    /// Runs the command and returns the response payload.
    pub async fn execute(&self, cache: &Cache) -> Result<Vec<u8>, CacheError> {
        match self {
            Command::Set { key, value, ttl_ms } => {
                cache
                    .set(key, value, Duration::from_millis(u64::from(*ttl_ms)))
                    .await?;
                Ok(RESPONSE_OK.to_vec())
            }
            Command::Get { key } => cache.get(key).await,
            Command::Has { key } => {
                let found = cache.has(key).await;
                Ok(if found { RESPONSE_TRUE } else { RESPONSE_FALSE }.to_vec())
            }
            Command::Delete { key } => {
                cache.delete(key).await;
                Ok(RESPONSE_DELETED.to_vec())
            }
            Command::Show => Ok(cache.show().await.into_bytes()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Set { key, value, ttl_ms } => write!(
                f,
                "SET {} {} {}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value),
                ttl_ms
            ),
            Command::Get { key } => write!(f, "GET {}", String::from_utf8_lossy(key)),
            Command::Has { key } => write!(f, "HAS {}", String::from_utf8_lossy(key)),
            Command::Delete { key } => write!(f, "DELETE {}", String::from_utf8_lossy(key)),
            Command::Show => f.write_str("SHOW"),
        }
    }
}
