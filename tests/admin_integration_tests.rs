//! Integration Tests for the Admin API
//!
//! Tests the full request/response cycle for each admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use dcache::admin::create_router;
use dcache::server::{FollowerSet, RoleName};
use dcache::{AdminState, Cache, Storage};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app(cache: Arc<Cache>, followers: Arc<FollowerSet>) -> Router {
    create_router(AdminState::new(cache, followers, RoleName::Leader))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(Arc::new(Cache::unbounded()), Arc::new(FollowerSet::new()));

    let (status, json) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["role"], "leader");
    assert!(json["timestamp"].is_string());
}

// == Stats Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint_unbounded() {
    let cache = Arc::new(Cache::unbounded());
    cache
        .set(b"foo", b"bar", Duration::from_secs(60))
        .await
        .unwrap();
    cache.get(b"foo").await.unwrap();
    let _ = cache.get(b"missing").await;

    let app = create_test_app(cache, Arc::new(FollowerSet::new()));
    let (status, json) = get_json(app, "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["total_entries"], 1);
    assert_eq!(json["hit_rate"], 0.5);
    assert!(json.get("capacity").is_none());
    assert_eq!(json["occupancy"], Value::Array(Vec::new()));
    assert_eq!(json["followers"], 0);
}

#[tokio::test]
async fn test_stats_endpoint_bounded() {
    let storage = Storage::bounded([(4, 3), (9, 2), (14, 1)]).unwrap();
    let cache = Arc::new(Cache::new(storage));
    for key in [&b"k1"[..], &b"k2"[..], &b"k3"[..]] {
        cache.set(key, b"abc", Duration::from_secs(60)).await.unwrap();
    }
    cache
        .set(b"k4", b"abcdefgh", Duration::from_secs(60))
        .await
        .unwrap();

    let app = create_test_app(cache, Arc::new(FollowerSet::new()));
    let (_, json) = get_json(app, "/stats").await;

    assert_eq!(json["capacity"], 6);
    assert_eq!(json["total_entries"], 4);
    assert_eq!(json["occupancy"][0]["size"], 4);
    assert_eq!(json["occupancy"][0]["used"], 3);
    assert_eq!(json["occupancy"][1]["size"], 9);
    assert_eq!(json["occupancy"][1]["used"], 1);
    assert_eq!(json["occupancy"][2]["used"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_stats_endpoint_reports_swept() {
    let cache = Arc::new(Cache::unbounded());
    cache
        .set(b"short", b"v", Duration::from_millis(10))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_millis(20)).await;
    cache.sweep_expired().await;

    let app = create_test_app(cache, Arc::new(FollowerSet::new()));
    let (_, json) = get_json(app, "/stats").await;

    assert_eq!(json["swept"], 1);
    assert_eq!(json["total_entries"], 0);
}

#[tokio::test]
async fn test_stats_endpoint_counts_followers() {
    let followers = Arc::new(FollowerSet::new());
    let (a, _a_peer) = tokio::io::duplex(16);
    let (b, _b_peer) = tokio::io::duplex(16);
    followers.insert("127.0.0.1:7001", a).await;
    followers.insert("127.0.0.1:7002", b).await;

    let app = create_test_app(Arc::new(Cache::unbounded()), followers);
    let (_, json) = get_json(app, "/stats").await;

    assert_eq!(json["followers"], 2);
}
