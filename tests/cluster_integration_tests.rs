//! Integration Tests for Leader/Follower Replication
//!
//! Runs real nodes on loopback sockets and checks that writes accepted by
//! the leader show up in every follower's cache.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dcache::server::FollowerSet;
use dcache::{Cache, Client, Server, ServerOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

// == Helper Functions ==

struct Node {
    addr: SocketAddr,
    cache: Arc<Cache>,
    followers: Arc<FollowerSet>,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_node(options: ServerOptions) -> Node {
    let server = Server::bind(options, Arc::new(Cache::unbounded()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let cache = server.cache();
    let followers = server.followers();
    let handle = tokio::spawn(server.run_until(std::future::pending()));

    Node {
        addr,
        cache,
        followers,
        handle,
    }
}

async fn start_leader() -> Node {
    start_node(ServerOptions::leader("127.0.0.1:0")).await
}

async fn start_follower(leader: &Node) -> Node {
    start_node(ServerOptions::follower("127.0.0.1:0", leader.addr.to_string())).await
}

async fn wait_for_followers(followers: &FollowerSet, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while followers.len().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("leader never reached {expected} followers"));
}

async fn wait_for_key(cache: &Cache, key: &[u8], present: bool) {
    tokio::time::timeout(WAIT, async {
        while cache.has(key).await != present {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("key presence never became {present}"));
}

async fn connected_client(node: &Node) -> Client {
    let client = Client::new([node.addr.to_string()]);
    client.connect(3, Duration::from_millis(50)).await.unwrap();
    client
}

// == Replication Tests ==

#[tokio::test]
async fn test_set_reaches_both_followers() {
    let leader = start_leader().await;
    let f1 = start_follower(&leader).await;
    let f2 = start_follower(&leader).await;
    wait_for_followers(&leader.followers, 2).await;

    let client = connected_client(&leader).await;
    let response = client
        .set("foo", b"bar", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(response, b"OK");

    for follower in [&f1, &f2] {
        wait_for_key(&follower.cache, b"foo", true).await;
        assert_eq!(follower.cache.get(b"foo").await.unwrap(), b"bar");
    }
}

#[tokio::test]
async fn test_delete_replicates() {
    let leader = start_leader().await;
    let follower = start_follower(&leader).await;
    wait_for_followers(&leader.followers, 1).await;

    let client = connected_client(&leader).await;
    client.set("k", b"v", Duration::from_secs(60)).await.unwrap();
    wait_for_key(&follower.cache, b"k", true).await;

    assert_eq!(client.delete("k").await.unwrap(), b"DELETED");
    wait_for_key(&follower.cache, b"k", false).await;
}

#[tokio::test]
async fn test_writes_apply_in_order() {
    let leader = start_leader().await;
    let follower = start_follower(&leader).await;
    wait_for_followers(&leader.followers, 1).await;

    let client = connected_client(&leader).await;
    for i in 0..50 {
        client
            .set("counter", i.to_string().as_bytes(), Duration::from_secs(60))
            .await
            .unwrap();
    }
    client.set("done", b"1", Duration::from_secs(60)).await.unwrap();

    wait_for_key(&follower.cache, b"done", true).await;
    assert_eq!(follower.cache.get(b"counter").await.unwrap(), b"49");
}

#[tokio::test]
async fn test_reads_are_not_replicated() {
    let leader = start_leader().await;
    let follower = start_follower(&leader).await;
    wait_for_followers(&leader.followers, 1).await;

    let client = connected_client(&leader).await;
    client.set("a", b"1", Duration::from_secs(60)).await.unwrap();
    assert!(client.has("a").await.unwrap());
    assert_eq!(client.get("a").await.unwrap(), b"1");
    client.set("b", b"2", Duration::from_secs(60)).await.unwrap();

    wait_for_key(&follower.cache, b"b", true).await;
    let stats = follower.cache.stats().await;
    assert_eq!(stats.hits + stats.misses, 0, "reads must not be forwarded");
}

#[tokio::test]
async fn test_late_follower_gets_no_backfill() {
    let leader = start_leader().await;
    let client = connected_client(&leader).await;
    client.set("early", b"1", Duration::from_secs(60)).await.unwrap();

    let follower = start_follower(&leader).await;
    wait_for_followers(&leader.followers, 1).await;
    client.set("late", b"2", Duration::from_secs(60)).await.unwrap();

    wait_for_key(&follower.cache, b"late", true).await;
    assert!(!follower.cache.has(b"early").await);
}

#[tokio::test]
async fn test_departed_follower_is_dropped() {
    let leader = start_leader().await;
    let staying = start_follower(&leader).await;
    let leaving = start_follower(&leader).await;
    wait_for_followers(&leader.followers, 2).await;

    leaving.handle.abort();
    wait_for_followers(&leader.followers, 1).await;

    let client = connected_client(&leader).await;
    assert_eq!(
        client.set("k", b"v", Duration::from_secs(60)).await.unwrap(),
        b"OK"
    );
    wait_for_key(&staying.cache, b"k", true).await;
}

// == Follower Behaviour Tests ==

#[tokio::test]
async fn test_follower_serves_reads_and_refuses_writes() {
    let leader = start_leader().await;
    let follower = start_follower(&leader).await;
    wait_for_followers(&leader.followers, 1).await;

    let leader_client = connected_client(&leader).await;
    leader_client
        .set("k", b"v", Duration::from_secs(60))
        .await
        .unwrap();
    wait_for_key(&follower.cache, b"k", true).await;

    let follower_client = connected_client(&follower).await;
    assert_eq!(follower_client.get("k").await.unwrap(), b"v");
    assert_eq!(
        follower_client
            .set("k", b"other", Duration::from_secs(60))
            .await
            .unwrap(),
        b"follower is read-only"
    );
    assert_eq!(
        follower_client.delete("k").await.unwrap(),
        b"follower is read-only"
    );
    assert_eq!(follower.cache.get(b"k").await.unwrap(), b"v");
}

#[tokio::test]
async fn test_follower_refuses_follower_handshake() {
    let leader = start_leader().await;
    let follower = start_follower(&leader).await;

    let mut stream = TcpStream::connect(follower.addr).await.unwrap();
    stream.write_all(b"F").await.unwrap();

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0, "connection should be closed");
    assert!(follower.followers.is_empty().await);
}

#[tokio::test]
async fn test_follower_stops_when_leader_link_closes() {
    let fake_leader = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let leader_addr = fake_leader.local_addr().unwrap().to_string();

    let follower = start_node(ServerOptions::follower("127.0.0.1:0", leader_addr)).await;

    let (mut link, _) = fake_leader.accept().await.unwrap();
    let mut role = [0u8; 1];
    link.read_exact(&mut role).await.unwrap();
    assert_eq!(&role, b"F");
    drop(link);

    let result = tokio::time::timeout(WAIT, follower.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_err());
}

// == Wire Level Tests ==

#[tokio::test]
async fn test_invalid_bytes_get_error_text_and_connection_survives() {
    let leader = start_leader().await;

    let mut stream = TcpStream::connect(leader.addr).await.unwrap();
    stream.write_all(b"C").await.unwrap();

    let mut buf = [0u8; 2048];
    stream.write_all(&[0x07, 0x01]).await.unwrap();
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"invalid command");

    stream.write_all(&[0x04]).await.unwrap();
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"(empty)");
}

#[tokio::test]
async fn test_unknown_role_is_dropped() {
    let leader = start_leader().await;

    let mut stream = TcpStream::connect(leader.addr).await.unwrap();
    stream.write_all(b"X").await.unwrap();

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}
