//! Peer connections: accept TCP peers and fan sealed blocks out to them.
//!
//! Peers only receive announcements; anything they send is read into a
//! fixed-size buffer and discarded. Messages are JSON documents, one per line.
//!
//! Every peer gets its own bounded outbound queue drained by a writer task,
//! so a peer that stops reading can only stall itself. Its queue fills up
//! (or a write times out) and the peer is dropped.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, UnboundedReceiver, error::TrySendError};
use tokio::sync::oneshot;

use crate::blockchain::BlockRecord;

/// Announcements that may wait for a slow peer before it is dropped.
pub const OUTBOUND_QUEUE: usize = 64;

/// Longest a single write to a peer may take.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    NewBlock { block: BlockRecord },
}

struct PeerLink {
    id: u64,
    outbound: mpsc::Sender<Arc<str>>,
}

/// Registry of connected peers. Cheap to clone; clones share the registry.
///
/// The registry lock is never held across an `.await`.
#[derive(Clone)]
pub struct PeerHub {
    peers: Arc<Mutex<HashMap<SocketAddr, PeerLink>>>,
    next_id: Arc<AtomicU64>,
    queue_len: usize,
    write_timeout: Duration,
}

impl Default for PeerHub {
    fn default() -> Self {
        Self::with_limits(OUTBOUND_QUEUE, WRITE_TIMEOUT)
    }
}

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(queue_len: usize, write_timeout: Duration) -> Self {
        Self {
            peers: Arc::default(),
            next_id: Arc::default(),
            queue_len: queue_len.max(1),
            write_timeout,
        }
    }

    /// Accept peers forever. Only returns if the listener itself fails.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("P2P - listening on {addr}");
        }
        loop {
            let (stream, addr) = listener.accept().await?;
            info!("P2P - peer connected: {addr}");

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (reader, writer) = stream.into_split();
            let (outbound, queue) = mpsc::channel(self.queue_len);
            // Resolves (as closed) once the writer task is gone
            let (writer_alive, writer_gone) = oneshot::channel::<()>();

            self.peers
                .lock()
                .expect("mutex poisoned")
                .insert(addr, PeerLink { id, outbound });

            let hub = self.clone();
            tokio::spawn(async move {
                hub.pump(addr, id, writer, queue).await;
                drop(writer_alive);
            });
            let hub = self.clone();
            tokio::spawn(async move { hub.watch(addr, id, reader, writer_gone).await });
        }
    }

    /// Write queued announcements to one peer until its queue is dropped or
    /// a write fails or times out.
    async fn pump(
        &self,
        addr: SocketAddr,
        id: u64,
        mut writer: OwnedWriteHalf,
        mut queue: mpsc::Receiver<Arc<str>>,
    ) {
        while let Some(line) = queue.recv().await {
            match tokio::time::timeout(self.write_timeout, writer.write_all(line.as_bytes())).await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("P2P - dropping peer {addr}: {e}");
                    break;
                }
                Err(_) => {
                    warn!("P2P - dropping peer {addr}: write timed out");
                    break;
                }
            }
        }
        self.forget(addr, id);
    }

    /// Discard whatever the peer sends until it hangs up or its writer
    /// task ends, then forget it.
    async fn watch(
        &self,
        addr: SocketAddr,
        id: u64,
        mut reader: OwnedReadHalf,
        mut writer_gone: oneshot::Receiver<()>,
    ) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => debug!("P2P - ignoring {n} byte(s) from {addr}"),
                    Err(e) => {
                        debug!("P2P - read from {addr} failed: {e}");
                        break;
                    }
                },
                _ = &mut writer_gone => break,
            }
        }
        self.forget(addr, id);
    }

    /// Remove `addr` from the registry if it still refers to connection `id`.
    fn forget(&self, addr: SocketAddr, id: u64) {
        let mut peers = self.peers.lock().expect("mutex poisoned");
        if peers.get(&addr).is_some_and(|link| link.id == id) {
            peers.remove(&addr);
            info!("P2P - peer disconnected: {addr}");
        }
    }

    /// Queue a `new_block` announcement for every connected peer. Peers whose
    /// queue is full or closed are dropped. Returns how many peers it was
    /// queued for; delivery happens in the background.
    pub fn broadcast_block(&self, block: &BlockRecord) -> usize {
        let message = PeerMessage::NewBlock {
            block: block.clone(),
        };
        let mut json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("P2P - cannot encode block {}: {e}", block.digest);
                return 0;
            }
        };
        debug!("P2P - broadcast: {json}");
        json.push('\n');
        let line: Arc<str> = json.into();

        let mut peers = self.peers.lock().expect("mutex poisoned");
        peers.retain(|addr, link| match link.outbound.try_send(line.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("P2P - dropping peer {addr}: outbound queue full");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        peers.len()
    }

    /// Forward every block coming out of the miner until the channel closes.
    pub async fn relay(self, mut sealed: UnboundedReceiver<BlockRecord>) {
        while let Some(block) = sealed.recv().await {
            let reached = self.broadcast_block(&block);
            info!("P2P - block {} announced to {reached} peer(s)", block.digest);
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().expect("mutex poisoned").len()
    }
}
