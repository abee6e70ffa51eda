use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use peermail_core::address::RoomId;
use peermail_core::error::{PeerMailError, Result};
use peermail_core::protocol::packet::{decode_mime, decode_packet, encode_packet, PeerPacket};

use super::pending::PendingAcks;
use super::types::{PeerEvent, PeerId, RoomEvent};
use crate::transport::lines::LineReader;

/// Per-peer outbound queue depth (lines).
const PEER_QUEUE: usize = 256;

/// One packet carries a whole base64 message, so peer lines get more room
/// than protocol command lines.
const MAX_PACKET_BYTES: usize = 32 * 1024 * 1024;

/// One connected peer: its writer queue and the reader task.
struct PeerLink {
    seq: u64,
    tx: mpsc::Sender<String>,
    reader: JoinHandle<()>,
}

struct RoomInner {
    id: RoomId,
    peers: DashMap<PeerId, PeerLink>,
    pending: Arc<PendingAcks>,
    events: mpsc::Sender<RoomEvent>,
    destroyed: AtomicBool,
    link_seq: AtomicU64,
}

/// Peer room handle. Cheap to clone; all clones share one peer set and one
/// pending table.
#[derive(Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

/// Deferred outcome of `send_message`.
pub struct Delivery {
    id: String,
    rx: oneshot::Receiver<Result<()>>,
}

impl Delivery {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolves once the send is acked, timed out, or the room is destroyed.
    pub async fn wait(self) -> Result<()> {
        self.rx
            .await
            .map_err(|_| PeerMailError::Internal("delivery outcome dropped".into()))?
    }
}

impl Room {
    /// Create a room that reports to `events`.
    pub fn new(id: RoomId, events: mpsc::Sender<RoomEvent>) -> Self {
        Self {
            inner: Arc::new(RoomInner {
                id,
                peers: DashMap::new(),
                pending: Arc::new(PendingAcks::new()),
                events,
                destroyed: AtomicBool::new(false),
                link_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Create a room together with its own event channel.
    pub fn channel(id: RoomId, capacity: usize) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> &RoomId {
        &self.inner.id
    }

    /// Binary room id, used to join the discovery substrate.
    pub fn topic(&self) -> [u8; 32] {
        self.inner.id.topic()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.inner.peers.iter().map(|p| p.key().clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Track a newly connected peer stream. A peer id that is already
    /// present has its old stream replaced.
    pub fn add_peer<S>(&self, peer: impl Into<PeerId>, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.is_destroyed() {
            return Err(PeerMailError::RoomDestroyed);
        }
        let peer = peer.into();
        let seq = self.inner.link_seq.fetch_add(1, Ordering::Relaxed);
        let (rd, wr) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel::<String>(PEER_QUEUE);

        let span = tracing::info_span!("peer", room = %self.inner.id, peer = %peer);
        tokio::spawn(write_loop(Arc::clone(&self.inner), peer.clone(), wr, rx).instrument(span.clone()));
        let reader = tokio::spawn(read_loop(Arc::clone(&self.inner), peer.clone(), seq, rd).instrument(span));

        if let Some(old) = self.inner.peers.insert(peer.clone(), PeerLink { seq, tx, reader }) {
            old.reader.abort();
            debug!(room = %self.inner.id, peer = %peer, "replaced existing peer stream");
        }
        // destroy may have drained the table between the check above and the insert
        if self.is_destroyed() {
            if let Some((_, link)) = self.inner.peers.remove_if(&peer, |_, l| l.seq == seq) {
                link.reader.abort();
            }
            return Err(PeerMailError::RoomDestroyed);
        }

        info!(room = %self.inner.id, peer = %peer, peers = self.inner.peers.len(), "peer connected");
        let _ = self.inner.events.try_send(RoomEvent::PeerJoined {
            room: self.inner.id.clone(),
            peer,
        });
        Ok(())
    }

    /// Stop tracking a peer and close its stream. Returns false if unknown.
    pub fn remove_peer(&self, peer: &str) -> bool {
        match self.inner.peers.remove(peer) {
            Some((_, link)) => {
                link.reader.abort();
                drop(link.tx);
                info!(room = %self.inner.id, peer = %peer, "peer removed");
                let _ = self.inner.events.try_send(RoomEvent::PeerLeft {
                    room: self.inner.id.clone(),
                    peer: peer.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Follow a substrate's connect/disconnect stream until it ends or the
    /// room is destroyed.
    pub fn attach<S>(&self, mut events: mpsc::Receiver<PeerEvent<S>>) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let room = self.clone();
        tokio::spawn(async move {
            while let Some(ev) = events.recv().await {
                match ev {
                    PeerEvent::Connected { peer, stream } => {
                        if let Err(e) = room.add_peer(peer, stream) {
                            warn!(room = %room.id(), error = %e, "peer rejected");
                            break;
                        }
                    }
                    PeerEvent::Disconnected { peer } => {
                        room.remove_peer(&peer);
                    }
                }
            }
        })
    }

    /// Broadcast a MESSAGE and register a pending acknowledgement for `id`.
    ///
    /// Fails immediately (nothing registered) when no peer is connected.
    pub fn send_message(&self, id: &str, raw: &[u8], timeout: Duration) -> Result<Delivery> {
        if self.is_destroyed() {
            return Err(PeerMailError::RoomDestroyed);
        }
        if self.inner.peers.is_empty() {
            return Err(PeerMailError::NoPeers);
        }

        let line = encode_packet(&PeerPacket::message(id, raw))?;
        // register before writing so a fast ack cannot outrun the entry
        let rx = self.inner.pending.register(id, timeout)?;
        // destroy may have run fail_all before the entry landed
        if self.is_destroyed() {
            self.inner.pending.fail(id, PeerMailError::RoomDestroyed);
            return Err(PeerMailError::RoomDestroyed);
        }
        let sent = self.broadcast(line);
        debug!(room = %self.inner.id, id = %id, peers = sent, "message sent");

        Ok(Delivery {
            id: id.to_string(),
            rx,
        })
    }

    /// Broadcast an ACK for `id`. Fire-and-forget.
    pub fn send_ack(&self, id: &str) -> Result<()> {
        let line = encode_packet(&PeerPacket::ack(id))?;
        let sent = self.broadcast(line);
        if sent == 0 {
            debug!(room = %self.inner.id, id = %id, "ack dropped: no peers");
        }
        Ok(())
    }

    fn broadcast(&self, line: String) -> usize {
        let mut sent = 0;
        for p in self.inner.peers.iter() {
            match p.value().tx.try_send(line.clone()) {
                Ok(()) => sent += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(room = %self.inner.id, peer = %p.key(), "peer queue full; line dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        sent
    }

    /// Close every peer stream and fail every pending send with
    /// `RoomDestroyed`. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let peers: Vec<PeerId> = self.peers();
        for peer in peers {
            if let Some((_, link)) = self.inner.peers.remove(&peer) {
                link.reader.abort();
            }
        }
        let failed = self.inner.pending.fail_all();
        info!(room = %self.inner.id, failed, "room destroyed");
    }
}

async fn write_loop<W>(
    room: Arc<RoomInner>,
    peer: PeerId,
    mut wr: W,
    mut rx: mpsc::Receiver<String>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let res = async {
            wr.write_all(line.as_bytes()).await?;
            wr.flush().await
        }
        .await;
        if let Err(e) = res {
            warn!(error = %e, "peer write failed");
            let _ = room
                .events
                .send(RoomEvent::PeerError {
                    room: room.id.clone(),
                    peer: peer.clone(),
                    error: e.to_string(),
                })
                .await;
            return;
        }
    }
    // queue closed: peer removed or room destroyed
    let _ = wr.shutdown().await;
}

async fn read_loop<R>(room: Arc<RoomInner>, peer: PeerId, seq: u64, rd: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LineReader::with_limit(rd, MAX_PACKET_BYTES);
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "peer read failed");
                let _ = room
                    .events
                    .send(RoomEvent::PeerError {
                        room: room.id.clone(),
                        peer: peer.clone(),
                        error: e.to_string(),
                    })
                    .await;
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let ev = match decode_packet(&line) {
            Ok(PeerPacket::Message { id, mime }) => match decode_mime(&mime) {
                Ok(raw) => RoomEvent::Message {
                    room: room.id.clone(),
                    peer: peer.clone(),
                    id,
                    raw,
                },
                Err(e) => {
                    warn!(id = %id, error = %e, "dropping message with bad mime");
                    continue;
                }
            },
            Ok(PeerPacket::Ack { id }) => {
                let settled = room.pending.settle(&id);
                debug!(id = %id, settled, "ack received");
                RoomEvent::Ack {
                    room: room.id.clone(),
                    peer: peer.clone(),
                    id,
                    settled,
                }
            }
            Err(e) => {
                warn!(code = e.code().as_str(), error = %e, "dropping peer line");
                continue;
            }
        };

        if room.events.send(ev).await.is_err() {
            debug!("room event consumer gone");
        }
    }

    // stream ended on its own; forget this link unless it was already replaced
    if room.peers.remove_if(&peer, |_, l| l.seq == seq).is_some() {
        info!(room = %room.id, peer = %peer, "peer disconnected");
        let _ = room
            .events
            .send(RoomEvent::PeerLeft {
                room: room.id.clone(),
                peer,
            })
            .await;
    }
}
