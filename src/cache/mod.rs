//! Cache Module
//!
//! Wraps a storage engine with per-key expiration and a sweep hook for the
//! background cleanup task.

mod stats;
mod store;


// Re-export public types
pub use stats::{CacheCounters, CacheStats};
pub use store::Cache;
