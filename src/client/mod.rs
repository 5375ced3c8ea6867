//! Client Module
//!
//! Routing client that spreads keys over cache nodes with a consistent hash
//! ring and keeps one connection per node.

mod connection;

pub use connection::NodeConnection;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::protocol::{Command, RESPONSE_TRUE};
use crate::ring::ConsistentHashRing;

/// Default bytes read for a single response.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2048;

#[derive(Debug)]
struct ClientState {
    ring: ConsistentHashRing,
    conns: HashMap<String, Arc<NodeConnection>>,
    done: bool,
}

// == Client ==
/// Cache client.
///
/// The routing table (ring plus connection records) sits behind one lock;
/// each connection serializes its own commands. `end` is terminal: every
/// later call fails with `TerminatedClient`.
#[derive(Debug)]
pub struct Client {
    state: RwLock<ClientState>,
    read_buffer_size: usize,
}

impl Client {
    // == Constructor ==
    /// Registers `nodes` on the ring with inactive connections. Call
    /// `connect` before issuing commands.
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = ConsistentHashRing::new();
        let mut conns = HashMap::new();
        for addr in nodes {
            let addr = addr.into();
            ring.add(&addr);
            conns.insert(addr.clone(), Arc::new(NodeConnection::new(addr)));
        }

        Self {
            state: RwLock::new(ClientState {
                ring,
                conns,
                done: false,
            }),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    // == Connect ==
    /// Establishes every inactive connection; active ones are left alone.
    ///
    /// Stops at the first node whose retries run out and returns its error.
    /// Dialing happens outside the routing-table lock, so commands to other
    /// nodes keep flowing while a connect is in progress.
    pub async fn connect(&self, retries: u32, retry_interval: Duration) -> Result<(), ClientError> {
        let mut conns: Vec<Arc<NodeConnection>> = {
            let state = self.state.read().await;
            if state.done {
                return Err(ClientError::TerminatedClient);
            }
            state.conns.values().cloned().collect()
        };
        conns.sort_by(|a, b| a.addr().cmp(b.addr()));

        for conn in &conns {
            if conn.is_active().await {
                continue;
            }
            conn.establish(retries, retry_interval).await?;
        }

        // `end` may have run while we were dialing
        if self.state.read().await.done {
            for conn in &conns {
                conn.close().await;
            }
            return Err(ClientError::TerminatedClient);
        }
        Ok(())
    }

    // == Add Node ==
    /// Connects to `addr` and, once connected, routes keys to it.
    pub async fn add_node(
        &self,
        addr: &str,
        retries: u32,
        retry_interval: Duration,
    ) -> Result<(), ClientError> {
        if self.state.read().await.done {
            return Err(ClientError::TerminatedClient);
        }

        let conn = Arc::new(NodeConnection::new(addr));
        conn.establish(retries, retry_interval).await?;

        let replaced = {
            let mut state = self.state.write().await;
            if state.done {
                drop(state);
                conn.close().await;
                return Err(ClientError::TerminatedClient);
            }
            state.ring.add(addr);
            state.conns.insert(addr.to_string(), conn)
        };
        if let Some(old) = replaced {
            old.close().await;
        }

        info!(node = %addr, "Node added");
        Ok(())
    }

    // == Remove Node ==
    /// Closes the connection to `addr` and stops routing keys to it.
    pub async fn remove_node(&self, addr: &str) -> Result<(), ClientError> {
        let removed = {
            let mut state = self.state.write().await;
            if state.done {
                return Err(ClientError::TerminatedClient);
            }
            state.ring.remove(addr);
            state.conns.remove(addr)
        };

        if let Some(conn) = removed {
            conn.close().await;
            info!(node = %addr, "Node removed");
        }
        Ok(())
    }

    // == Commands ==
    /// Stores `value` under `key` for `ttl`. Returns the node's response.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<Vec<u8>, ClientError> {
        self.exec(key, Command::set(key, value, ttl)).await
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, ClientError> {
        self.exec(key, Command::get(key)).await
    }

    pub async fn has(&self, key: &str) -> Result<bool, ClientError> {
        let response = self.exec(key, Command::has(key)).await?;
        Ok(response == RESPONSE_TRUE)
    }

    pub async fn delete(&self, key: &str) -> Result<Vec<u8>, ClientError> {
        self.exec(key, Command::delete(key)).await
    }

    /// Debug dump of the entries held by the node at `addr`.
    pub async fn show(&self, addr: &str) -> Result<Vec<u8>, ClientError> {
        let conn = {
            let state = self.state.read().await;
            if state.done {
                return Err(ClientError::TerminatedClient);
            }
            state
                .conns
                .get(addr)
                .cloned()
                .ok_or_else(|| ClientError::ConnectionInactive(addr.to_string()))?
        };

        let bytes = Command::Show.encode()?;
        conn.exec(&bytes, self.read_buffer_size).await
    }

    // == End ==
    /// Closes every connection and terminates the client.
    pub async fn end(&self) -> Result<(), ClientError> {
        let conns = {
            let mut state = self.state.write().await;
            if state.done {
                return Err(ClientError::TerminatedClient);
            }
            state.done = true;
            state.ring = ConsistentHashRing::new();
            std::mem::take(&mut state.conns)
        };

        for conn in conns.into_values() {
            conn.close().await;
        }
        info!("Client terminated");
        Ok(())
    }

    // == Introspection ==
    /// Address of the node that owns `key`.
    pub async fn node_for(&self, key: &str) -> Option<String> {
        self.state.read().await.ring.get(key).map(str::to_string)
    }

    /// Registered node addresses, sorted.
    pub async fn nodes(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut nodes: Vec<String> = state.conns.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    pub async fn is_active(&self, addr: &str) -> bool {
        let conn = self.state.read().await.conns.get(addr).cloned();
        match conn {
            Some(conn) => conn.is_active().await,
            None => false,
        }
    }

    // Routes `cmd` by `key` and runs it on the owning node.
    async fn exec(&self, key: &str, cmd: Command) -> Result<Vec<u8>, ClientError> {
        let bytes = cmd.encode()?;

        let conn = {
            let state = self.state.read().await;
            if state.done {
                return Err(ClientError::TerminatedClient);
            }
            let addr = state
                .ring
                .get(key)
                .ok_or_else(|| ClientError::KeyNotRoutable(key.to_string()))?;
            state
                .conns
                .get(addr)
                .cloned()
                .ok_or_else(|| ClientError::ConnectionInactive(addr.to_string()))?
        };

        debug!(node = %conn.addr(), command = %cmd, "Executing command");
        conn.exec(&bytes, self.read_buffer_size).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_registers_inactive_nodes() {
        let client = Client::new(["127.0.0.1:3001", "127.0.0.1:3000"]);

        assert_eq!(client.nodes().await, vec!["127.0.0.1:3000", "127.0.0.1:3001"]);
        assert!(!client.is_active("127.0.0.1:3000").await);
        assert!(client.node_for("foo").await.is_some());
    }

    #[tokio::test]
    async fn test_command_on_inactive_node() {
        let client = Client::new(["127.0.0.1:1"]);

        let err = client.get("foo").await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionInactive(_)));
    }

    #[tokio::test]
    async fn test_command_without_nodes() {
        let client = Client::new(Vec::<String>::new());

        let err = client.get("foo").await.unwrap_err();
        assert!(matches!(err, ClientError::KeyNotRoutable(key) if key == "foo"));
    }

    #[tokio::test]
    async fn test_encode_errors_surface() {
        let client = Client::new(["127.0.0.1:1"]);
        let key = "k".repeat(300);

        let err = client.get(&key).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_end_is_terminal() {
        let client = Client::new(["127.0.0.1:1"]);
        client.end().await.unwrap();

        assert!(client.nodes().await.is_empty());
        assert!(matches!(
            client.connect(0, Duration::ZERO).await,
            Err(ClientError::TerminatedClient)
        ));
        assert!(matches!(
            client.get("foo").await,
            Err(ClientError::TerminatedClient)
        ));
        assert!(matches!(
            client.add_node("127.0.0.1:2", 0, Duration::ZERO).await,
            Err(ClientError::TerminatedClient)
        ));
        assert!(matches!(client.end().await, Err(ClientError::TerminatedClient)));
    }

    #[tokio::test]
    async fn test_remove_node_stops_routing() {
        let client = Client::new(["127.0.0.1:1", "127.0.0.1:2"]);
        client.remove_node("127.0.0.1:1").await.unwrap();

        assert_eq!(client.nodes().await, vec!["127.0.0.1:2"]);
        for i in 0..50 {
            let owner = client.node_for(&i.to_string()).await;
            assert_eq!(owner.as_deref(), Some("127.0.0.1:2"));
        }
    }
}
