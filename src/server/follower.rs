//! Follower Link Module
//!
//! The follower side of replication: dial the leader, then apply every
//! command it pushes to the local cache without replying.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::protocol::{frame_len, Command, ROLE_FOLLOWER};

// == Connect To Leader ==
/// Dials `leader_addr` and identifies as a follower.
pub(crate) async fn connect_to_leader(leader_addr: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(leader_addr)
        .await
        .with_context(|| format!("could not connect to leader {leader_addr}"))?;
    stream.set_nodelay(true)?;
    stream
        .write_all(&[ROLE_FOLLOWER])
        .await
        .context("follower handshake failed")?;

    info!(leader = %leader_addr, "Connected to leader");
    Ok(stream)
}

// == Follow Leader ==
/// Applies pushed commands until the leader closes the link.
///
/// Pushes may coalesce or split across reads, so bytes are buffered and
/// applied one complete frame at a time. Returns `Ok(())` on EOF.
pub(crate) async fn follow_leader<R>(mut link: R, cache: &Cache, read_buffer_size: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut pending = Vec::with_capacity(read_buffer_size);
    let mut chunk = vec![0u8; read_buffer_size];

    loop {
        let n = link.read(&mut chunk).await.context("leader link read failed")?;
        if n == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&chunk[..n]);
        apply_frames(&mut pending, cache).await;
    }
}

/// Applies every complete frame at the head of `pending`, leaving any
/// partial frame in place.
async fn apply_frames(pending: &mut Vec<u8>, cache: &Cache) {
    loop {
        let len = match frame_len(pending) {
            Ok(Some(len)) if pending.len() >= len => len,
            Ok(_) => return,
            Err(err) => {
                warn!(error = %err, discarded = pending.len(), "Unreadable bytes from leader");
                pending.clear();
                return;
            }
        };

        let frame: Vec<u8> = pending.drain(..len).collect();
        match Command::decode(&frame) {
            Ok(cmd) => {
                debug!(command = %cmd, "Applying replicated command");
                if let Err(err) = cmd.execute(cache).await {
                    warn!(command = %cmd, error = %err, "Replicated command failed");
                }
            }
            Err(err) => warn!(error = %err, "Dropped malformed frame from leader"),
        }
    }
}
