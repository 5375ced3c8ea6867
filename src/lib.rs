//! DCache - A distributed TTL key-value cache
//!
//! Nodes hold an in-memory cache with per-key expiry, over either an
//! unbounded map or a fixed-size slab arena. Clients spread keys across
//! nodes with a consistent hash ring, and a leader node pushes every write
//! to its followers.

pub mod admin;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod ring;
pub mod server;
pub mod storage;
pub mod tasks;

pub use admin::AdminState;
pub use cache::Cache;
pub use client::Client;
pub use config::Config;
pub use error::{CacheError, ClientError, ProtocolError, StorageError};
pub use protocol::Command;
pub use ring::ConsistentHashRing;
pub use server::{Role, Server, ServerOptions};
pub use storage::Storage;
pub use tasks::spawn_sweep_task;
