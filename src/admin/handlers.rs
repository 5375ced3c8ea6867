//! Admin Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::cache::Cache;
use crate::models::{HealthResponse, StatsResponse};
use crate::server::{FollowerSet, RoleName};

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AdminState {
    /// Cache served by this node
    pub cache: Arc<Cache>,
    /// Followers attached to this node; always empty on a follower
    pub followers: Arc<FollowerSet>,
    pub role: RoleName,
}

impl AdminState {
    pub fn new(cache: Arc<Cache>, followers: Arc<FollowerSet>, role: RoleName) -> Self {
        Self {
            cache,
            followers,
            role,
        }
    }
}

/// Handler for GET /stats
///
/// Returns cache counters, storage occupancy and the follower count.
pub async fn stats_handler(State(state): State<AdminState>) -> Json<StatsResponse> {
    let stats = state.cache.stats().await;
    let occupancy = state.cache.occupancy().await;
    let followers = state.followers.len().await;

    Json(StatsResponse::new(stats, occupancy, followers))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use std::time::Duration;

    fn create_test_state() -> AdminState {
        let storage = Storage::bounded([(4, 3), (9, 2)]).unwrap();
        AdminState::new(
            Arc::new(Cache::new(storage)),
            Arc::new(FollowerSet::new()),
            RoleName::Leader,
        )
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = create_test_state();
        state
            .cache
            .set(b"k", b"abc", Duration::from_secs(60))
            .await
            .unwrap();
        state.cache.get(b"k").await.unwrap();
        let _ = state.cache.get(b"missing").await;

        let Json(stats) = stats_handler(State(state)).await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.capacity, Some(5));
        assert_eq!(stats.occupancy.len(), 2);
        assert_eq!(stats.occupancy[0].used, 1);
        assert_eq!(stats.followers, 0);
    }

    #[tokio::test]
    async fn test_stats_handler_counts_followers() {
        let state = create_test_state();
        let (writer, _reader) = tokio::io::duplex(16);
        state.followers.insert("127.0.0.1:9000", writer).await;

        let Json(stats) = stats_handler(State(state)).await;
        assert_eq!(stats.followers, 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(health) = health_handler(State(create_test_state())).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.role, RoleName::Leader);
    }
}
