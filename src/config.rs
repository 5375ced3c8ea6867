//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::error::StorageError;
use crate::server::{Role, ServerOptions, DEFAULT_READ_BUFFER_SIZE};
use crate::storage::Storage;

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// TCP address the node accepts peers on
    pub listen_addr: String,
    /// Leader to follow; `None` makes this node a leader
    pub leader_addr: Option<String>,
    /// Expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// `(value size, slot count)` pairs; `None` selects unbounded storage
    pub size_classes: Option<Vec<(usize, usize)>>,
    /// Role handshake timeout in seconds
    pub handshake_timeout: u64,
    /// Bytes read per command frame
    pub read_buffer_size: usize,
    /// Address for the HTTP admin surface, disabled when `None`
    pub admin_addr: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LISTEN_ADDR` - Peer listen address (default: 0.0.0.0:3000)
    /// - `LEADER_ADDR` - Leader to follow (default: unset, node is a leader)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 20)
    /// - `SIZE_CLASSES` - Bounded layout such as `4:3,9:2,14:1` (default: unset, unbounded)
    /// - `HANDSHAKE_TIMEOUT` - Role handshake timeout in seconds (default: 30)
    /// - `READ_BUFFER_SIZE` - Bytes read per command (default: 2048)
    /// - `ADMIN_ADDR` - HTTP admin address (default: unset, disabled)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let size_classes = non_empty("SIZE_CLASSES").and_then(|raw| {
            parse_size_classes(&raw)
                .map_err(|err| {
                    warn!("Ignoring SIZE_CLASSES={:?}: {}, using unbounded storage", raw, err)
                })
                .ok()
        });

        Self {
            listen_addr: non_empty("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            leader_addr: non_empty("LEADER_ADDR"),
            cleanup_interval: non_empty("CLEANUP_INTERVAL")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&secs| secs > 0)
                .unwrap_or(defaults.cleanup_interval),
            size_classes,
            handshake_timeout: non_empty("HANDSHAKE_TIMEOUT")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&secs| secs > 0)
                .unwrap_or(defaults.handshake_timeout),
            read_buffer_size: non_empty("READ_BUFFER_SIZE")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&size| size > 0)
                .unwrap_or(defaults.read_buffer_size),
            admin_addr: non_empty("ADMIN_ADDR"),
        }
    }

    pub fn role(&self) -> Role {
        match &self.leader_addr {
            Some(leader_addr) => Role::Follower {
                leader_addr: leader_addr.clone(),
            },
            None => Role::Leader,
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            listen_addr: self.listen_addr.clone(),
            role: self.role(),
            handshake_timeout: Duration::from_secs(self.handshake_timeout),
            read_buffer_size: self.read_buffer_size,
        }
    }

    /// Builds the configured storage engine.
    pub fn storage(&self) -> Result<Storage, StorageError> {
        match &self.size_classes {
            Some(layout) => Storage::bounded(layout.iter().copied()),
            None => Ok(Storage::unbounded()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            leader_addr: None,
            cleanup_interval: 20,
            size_classes: None,
            handshake_timeout: 30,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            admin_addr: None,
        }
    }
}

/// Parses a `size:capacity,...` layout such as `4:3,9:2,14:1`.
pub fn parse_size_classes(raw: &str) -> Result<Vec<(usize, usize)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| -> Result<(usize, usize), String> {
            let (size, capacity) = part
                .split_once(':')
                .ok_or_else(|| format!("expected size:capacity, got {part:?}"))?;
            let size = size
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid size in {part:?}"))?;
            let capacity = capacity
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid capacity in {part:?}"))?;
            Ok((size, capacity))
        })
        .collect()
}
