//! Server Module
//!
//! TCP node serving the wire protocol, either as a replication leader or as
//! a follower of one.
//!
//! Every accepted connection opens with a role byte: `C` for a client, `F`
//! for a follower. A leader executes client commands and pushes successful
//! mutations to its followers. A follower applies what its leader pushes and
//! serves reads to its own clients.

mod connection;
mod follower;
mod followers;

pub use followers::{spawn_replication_task, FollowerId, FollowerSet};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tracing::{error, info, warn};

use crate::cache::Cache;
use connection::{handle_connection, NodeContext};
use follower::{connect_to_leader, follow_leader};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2048;

// == Role ==
/// Replication role, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower { leader_addr: String },
}

impl Role {
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }

    pub fn name(&self) -> RoleName {
        match self {
            Role::Leader => RoleName::Leader,
            Role::Follower { .. } => RoleName::Follower,
        }
    }
}

/// Role without its addressing details, as reported by the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    Leader,
    Follower,
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleName::Leader => f.write_str("leader"),
            RoleName::Follower => f.write_str("follower"),
        }
    }
}

// == Server Options ==
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub listen_addr: String,
    pub role: Role,
    /// How long a new connection has to send its role byte
    pub handshake_timeout: Duration,
    /// Bytes read per command frame
    pub read_buffer_size: usize,
}

impl ServerOptions {
    pub fn leader(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            role: Role::Leader,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn follower(listen_addr: impl Into<String>, leader_addr: impl Into<String>) -> Self {
        Self {
            role: Role::Follower {
                leader_addr: leader_addr.into(),
            },
            ..Self::leader(listen_addr)
        }
    }
}

// == Server ==
pub struct Server {
    listener: TcpListener,
    options: ServerOptions,
    cache: Arc<Cache>,
    followers: Arc<FollowerSet>,
}

impl Server {
    /// Binds the listening socket. Nothing is accepted until `run_until`.
    pub async fn bind(options: ServerOptions, cache: Arc<Cache>) -> Result<Self> {
        let listener = TcpListener::bind(&options.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", options.listen_addr))?;

        Ok(Self {
            listener,
            options,
            cache,
            followers: Arc::new(FollowerSet::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn cache(&self) -> Arc<Cache> {
        Arc::clone(&self.cache)
    }

    pub fn followers(&self) -> Arc<FollowerSet> {
        Arc::clone(&self.followers)
    }

    pub fn role(&self) -> &Role {
        &self.options.role
    }

    // == Run ==
    /// Accepts connections until `shutdown` resolves.
    ///
    /// A follower dials its leader first and fails if it cannot. Its run
    /// also ends with an error when the leader link closes; there is no
    /// automatic reconnect.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            options,
            cache,
            followers,
        } = self;
        let local_addr = listener.local_addr()?;

        match &options.role {
            Role::Leader => {
                let (replication, _replication_task) =
                    spawn_replication_task(Arc::clone(&followers));
                let ctx = Arc::new(NodeContext {
                    cache,
                    followers,
                    replication: Some(replication),
                    handshake_timeout: options.handshake_timeout,
                    read_buffer_size: options.read_buffer_size,
                });

                info!(addr = %local_addr, "Leader listening");
                accept_until(&listener, &ctx, shutdown).await;
                Ok(())
            }
            Role::Follower { leader_addr } => {
                let link = connect_to_leader(leader_addr).await?;
                let ctx = Arc::new(NodeContext {
                    cache,
                    followers,
                    replication: None,
                    handshake_timeout: options.handshake_timeout,
                    read_buffer_size: options.read_buffer_size,
                });

                info!(addr = %local_addr, leader = %leader_addr, "Follower listening");
                let follow = follow_leader(link, &ctx.cache, options.read_buffer_size);
                tokio::pin!(follow);

                select! {
                    _ = accept_until(&listener, &ctx, shutdown) => Ok(()),
                    result = &mut follow => {
                        let err = match result {
                            Ok(()) => anyhow!("leader {leader_addr} closed the replication link"),
                            Err(err) => err.context(format!("lost replication link to {leader_addr}")),
                        };
                        error!(error = %err, "Follower stopping");
                        Err(err)
                    }
                }
            }
        }
    }
}

async fn accept_until<F>(listener: &TcpListener, ctx: &Arc<NodeContext>, shutdown: F)
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    loop {
        select! {
            _ = &mut shutdown => {
                info!("Server shutting down");
                break;
            }
            accept_result = listener.accept() => {
                handle_accept_result(accept_result, ctx);
            }
        }
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, ctx: &Arc<NodeContext>) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, ctx),
        Err(err) => warn!(error = ?err, "Failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, ctx: &Arc<NodeContext>) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let _ = stream.set_nodelay(true);
        if let Err(err) = handle_connection(stream, peer.to_string(), ctx).await {
            warn!(peer = %peer, error = ?err, "Connection closed with error");
        }
    });
}
