//! Connection Handling Module
//!
//! Role handshake and the per-connection command loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::error::CacheError;
use crate::protocol::{Command, ROLE_CLIENT, ROLE_FOLLOWER};
use crate::server::FollowerSet;

/// State shared by every connection a node accepts.
#[derive(Debug)]
pub(crate) struct NodeContext {
    pub cache: Arc<Cache>,
    pub followers: Arc<FollowerSet>,
    /// Present on a leader; feeds the replication task
    pub replication: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pub handshake_timeout: Duration,
    pub read_buffer_size: usize,
}

impl NodeContext {
    fn is_leader(&self) -> bool {
        self.replication.is_some()
    }
}

// == Handle Connection ==
/// Reads the role byte and dispatches the connection to its handler.
pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    peer: String,
    ctx: Arc<NodeContext>,
) -> Result<()> {
    let role = identify_peer_role(&mut stream, ctx.handshake_timeout).await?;

    match role {
        ROLE_CLIENT => {
            debug!(peer = %peer, "Client connected");
            handle_client(stream, &ctx).await
        }
        ROLE_FOLLOWER if ctx.is_leader() => {
            accept_follower(stream, peer, &ctx.followers).await;
            Ok(())
        }
        ROLE_FOLLOWER => bail!("follower handshake refused, this node is not a leader"),
        other => bail!("unknown role byte {other:#04x}"),
    }
}

// == Identify Peer Role ==
/// Reads the single handshake byte, giving up after `timeout`.
pub(crate) async fn identify_peer_role<R>(reader: &mut R, timeout: Duration) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, reader.read_u8())
        .await
        .context("role handshake timed out")?
        .context("role handshake read failed")
}

// == Client Loop ==
/// Serves commands until the peer closes the connection.
///
/// One read is one command; every command gets exactly one response, error
/// text included.
pub(crate) async fn handle_client<S>(mut stream: S, ctx: &NodeContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; ctx.read_buffer_size];

    loop {
        let n = stream.read(&mut buf).await.context("client read failed")?;
        if n == 0 {
            debug!("Client closed connection");
            return Ok(());
        }

        let response = process_command(&buf[..n], ctx).await;
        stream
            .write_all(&response)
            .await
            .context("client write failed")?;
    }
}

/// Decodes and executes one raw command, returning the response bytes.
///
/// On a leader, successful mutating commands are queued for the followers.
pub(crate) async fn process_command(raw: &[u8], ctx: &NodeContext) -> Vec<u8> {
    let cmd = match Command::decode(raw) {
        Ok(cmd) => cmd,
        Err(err) => {
            debug!(error = %err, "Rejected command");
            return err.to_string().into_bytes();
        }
    };

    if cmd.modifies_cache() && !ctx.is_leader() {
        return CacheError::ReadOnly.to_string().into_bytes();
    }

    debug!(command = %cmd, "Executing command");
    match cmd.execute(&ctx.cache).await {
        Ok(response) => {
            if let Some(replication) = ctx.replication.as_ref().filter(|_| cmd.modifies_cache()) {
                if replication.send(raw.to_vec()).is_err() {
                    warn!(command = %cmd, "Replication task is gone, write not forwarded");
                }
            }
            response
        }
        Err(err) => err.to_string().into_bytes(),
    }
}

// == Accept Follower ==
/// Registers a follower and holds its read side until it disconnects.
///
/// Followers never send anything after the handshake, so EOF or an error on
/// the read side means the link is gone.
async fn accept_follower(stream: TcpStream, peer: String, followers: &FollowerSet) {
    let (mut reader, writer) = stream.into_split();
    let id = followers.insert(peer.clone(), writer).await;

    let mut sink = [0u8; 64];
    loop {
        match reader.read(&mut sink).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }

    if followers.remove(id).await {
        info!(follower = %peer, "Follower disconnected");
    }
}
