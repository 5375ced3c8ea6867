//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::server::RoleName;
use crate::storage::ClassOccupancy;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of successful gets
    pub hits: u64,
    /// Number of gets on absent or expired keys
    pub misses: u64,
    /// Entries reclaimed by the expiry sweep
    pub swept: u64,
    /// Entries held by storage, including expired ones not yet swept
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Slot capacity, absent for unbounded storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    /// Per size class usage, empty for unbounded storage
    pub occupancy: Vec<ClassOccupancy>,
    /// Followers currently attached to this node
    pub followers: usize,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, occupancy: Vec<ClassOccupancy>, followers: usize) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            swept: stats.swept,
            total_entries: stats.total_entries,
            capacity: stats.capacity,
            occupancy,
            followers,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Replication role of this node
    pub role: RoleName,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(role: RoleName) -> Self {
        Self {
            status: "healthy".to_string(),
            role,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
