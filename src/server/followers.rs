//! Follower Set Module
//!
//! Connections a leader pushes mutating commands to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Identifies one follower connection inside the set.
pub type FollowerId = u64;

/// Frames a follower may have waiting before it counts as stalled.
pub const DEFAULT_FOLLOWER_QUEUE: usize = 1024;
/// Longest a single push to a follower may take.
pub const DEFAULT_FOLLOWER_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

type Frame = Arc<[u8]>;

struct FollowerLink {
    peer: String,
    queue: mpsc::Sender<Frame>,
    writer_task: JoinHandle<()>,
}

// == Follower Set ==
/// Followers connected to this leader.
///
/// Each follower has its own writer task fed by a bounded queue, so a slow
/// follower never holds up the others or the set's lock. Delivery is
/// at-most-once: a follower whose write fails, times out, or whose queue
/// overflows is dropped from the set and its connection shut down. It
/// rejoins only by dialing again, and receives no backfill of earlier
/// writes.
pub struct FollowerSet {
    followers: Mutex<HashMap<FollowerId, FollowerLink>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    write_timeout: Duration,
}

impl std::fmt::Debug for FollowerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowerSet")
            .field("next_id", &self.next_id)
            .field("queue_capacity", &self.queue_capacity)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for FollowerSet {
    fn default() -> Self {
        Self::with_limits(DEFAULT_FOLLOWER_QUEUE, DEFAULT_FOLLOWER_WRITE_TIMEOUT)
    }
}

impl FollowerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whose followers are dropped once `queue_capacity` frames are
    /// pending or a push takes longer than `write_timeout`.
    pub fn with_limits(queue_capacity: usize, write_timeout: Duration) -> Self {
        Self {
            followers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            queue_capacity: queue_capacity.max(1),
            write_timeout,
        }
    }

    // == Insert ==
    /// Registers a follower and starts its writer task.
    pub async fn insert<W>(&self, peer: impl Into<String>, writer: W) -> FollowerId
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = peer.into();
        let (queue, frames) = mpsc::channel(self.queue_capacity);
        let writer_task = tokio::spawn(run_writer(
            writer,
            frames,
            peer.clone(),
            self.write_timeout,
        ));
        info!(follower = %peer, id, "Follower joined");

        self.followers.lock().await.insert(
            id,
            FollowerLink {
                peer,
                queue,
                writer_task,
            },
        );
        id
    }

    // == Remove ==
    /// Drops a follower. Frames already queued are still written, then the
    /// connection is shut down. Returns whether it was still in the set.
    pub async fn remove(&self, id: FollowerId) -> bool {
        let link = self.followers.lock().await.remove(&id);
        match link {
            Some(link) => {
                info!(follower = %link.peer, id, "Follower removed");
                true
            }
            None => false,
        }
    }

    // == Broadcast ==
    /// Queues `frame` for every follower without waiting on their sockets.
    ///
    /// Followers whose queue is full or whose writer has stopped are removed.
    /// Returns how many followers the frame was queued for.
    pub async fn broadcast(&self, frame: &[u8]) -> usize {
        let frame: Frame = Arc::from(frame);

        let (queued, dropped) = {
            let mut followers = self.followers.lock().await;

            let mut unreachable = Vec::new();
            for (&id, link) in followers.iter() {
                match link.queue.try_send(Arc::clone(&frame)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(follower = %link.peer, "Follower queue full, dropping follower");
                        unreachable.push(id);
                    }
                    Err(TrySendError::Closed(_)) => unreachable.push(id),
                }
            }

            let dropped: Vec<(FollowerId, FollowerLink)> = unreachable
                .into_iter()
                .filter_map(|id| followers.remove(&id).map(|link| (id, link)))
                .collect();
            (followers.len(), dropped)
        };

        for (id, link) in &dropped {
            // Dropping the writer closes the connection even mid-write.
            link.writer_task.abort();
            info!(follower = %link.peer, id, "Follower removed");
        }

        debug!(queued, dropped = dropped.len(), "Fan-out complete");
        queued
    }

    pub async fn len(&self) -> usize {
        self.followers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Peer addresses of the connected followers, sorted.
    pub async fn peers(&self) -> Vec<String> {
        let followers = self.followers.lock().await;
        let mut peers: Vec<String> = followers.values().map(|l| l.peer.clone()).collect();
        peers.sort();
        peers
    }
}

// Writes queued frames to one follower until its queue closes or a write
// fails or times out, then shuts the connection down.
async fn run_writer<W>(
    mut writer: W,
    mut frames: mpsc::Receiver<Frame>,
    peer: String,
    write_timeout: Duration,
) where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(frame) = frames.recv().await {
        match timeout(write_timeout, writer.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(follower = %peer, error = %err, "Send to follower failed");
                break;
            }
            Err(_) => {
                warn!(follower = %peer, "Send to follower timed out");
                break;
            }
        }
    }

    let _ = timeout(write_timeout, writer.shutdown()).await;
    debug!(follower = %peer, "Follower writer stopped");
}

// == Replication Task ==
/// Spawns the task that pushes encoded mutating commands to every follower.
///
/// Frames are queued to each follower in the order they are sent on the
/// returned channel. The task ends once every sender is dropped.
pub fn spawn_replication_task(
    followers: Arc<FollowerSet>,
) -> (mpsc::UnboundedSender<Vec<u8>>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let handle = tokio::spawn(async move {
        debug!("Replication task started");
        while let Some(frame) = rx.recv().await {
            followers.broadcast(&frame).await;
        }
        debug!("Replication task stopped");
    });

    (tx, handle)
}
