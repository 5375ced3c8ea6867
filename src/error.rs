//! Error types for the cache
//!
//! Provides unified error handling using thiserror. The `Display` text of
//! `CacheError` and `ProtocolError` is what a server writes back to a peer
//! when a command fails, so it is part of the wire contract.

use std::io;

use thiserror::Error;

// == Storage Error Enum ==
/// Failures raised by a storage engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No size class is large enough for the value
    #[error("value of {0} bytes doesn't fit in any size class")]
    NoFittingClass(usize),

    /// The size class chosen for the value has no free slot
    #[error("cache is full")]
    Full(usize),

    /// The size class layout handed to the bounded storage is unusable
    #[error("invalid storage layout: {0}")]
    InvalidLayout(String),
}

// == Cache Error Enum ==
/// Errors surfaced by cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key absent or already expired
    #[error("key ({0}) not found")]
    KeyNotFound(String),

    /// Underlying storage refused the write
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Mutating command sent straight to a follower
    #[error("follower is read-only")]
    ReadOnly,
}

// == Protocol Error Enum ==
/// Malformed or unencodable wire commands.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid command")]
    InvalidCommand,

    #[error("invalid SET command")]
    InvalidSet,

    #[error("invalid GET command")]
    InvalidGet,

    #[error("invalid HAS command")]
    InvalidHas,

    #[error("invalid DELETE command")]
    InvalidDelete,

    #[error("invalid SHOW command")]
    InvalidShow,

    /// Keys are length-prefixed with a single byte
    #[error("key of {0} bytes exceeds the 255 byte limit")]
    KeyTooLong(usize),

    /// Values are length-prefixed with a u32
    #[error("value of {0} bytes exceeds the u32 length limit")]
    ValueTooLong(usize),
}

// == Client Error Enum ==
/// Errors returned by the routing client.
///
/// Callers branch on the variant to decide whether to reconnect, pick
/// another node or give up.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The node owning the key has no live connection
    #[error("({0}) connection is not active")]
    ConnectionInactive(String),

    /// I/O failed on an established connection; it is now inactive
    #[error("({addr}) connection error: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Every connect attempt to a node failed
    #[error("({addr}) all {attempts} attempts failed to connect: {source}")]
    ConnectFailed {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// `end()` was already called on this client
    #[error("this client is terminated")]
    TerminatedClient,

    /// The ring has no node for this key
    #[error("key ({0}) is not routable, no nodes registered")]
    KeyNotRoutable(String),

    /// Command could not be encoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
