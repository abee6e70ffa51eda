//! Outstanding-acknowledgement table.
//!
//! Every entry owns exactly one timer. Settlement always goes through
//! `DashMap::remove*`, so whichever of {ack, timeout, destroy} removes the
//! entry first is the only one that fulfills it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use peermail_core::error::{PeerMailError, Result};

type Outcome = oneshot::Sender<Result<()>>;

struct PendingEntry {
    seq: u64,
    outcome: Outcome,
    timer: JoinHandle<()>,
}

#[derive(Default)]
pub struct PendingAcks {
    entries: DashMap<String, PendingEntry>,
    seq: AtomicU64,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` with an armed timer. Fails if `id` is already pending.
    pub fn register(
        self: &Arc<Self>,
        id: &str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => Err(PeerMailError::DuplicateSend(id.to_string())),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                let table = Arc::clone(self);
                let key = id.to_string();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    // only the entry this timer was armed for
                    if let Some((_, e)) = table.entries.remove_if(&key, |_, e| e.seq == seq) {
                        debug!(id = %key, "ack timeout");
                        let _ = e.outcome.send(Err(PeerMailError::AckTimeout(key.clone())));
                    }
                });
                slot.insert(PendingEntry {
                    seq,
                    outcome: tx,
                    timer,
                });
                Ok(rx)
            }
        }
    }

    /// Fulfill `id` successfully. Returns false if nothing was pending.
    pub fn settle(&self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some((_, e)) => {
                e.timer.abort();
                let _ = e.outcome.send(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Fail `id` with `err`, cancelling its timer. Returns false if nothing
    /// was pending.
    pub fn fail(&self, id: &str, err: PeerMailError) -> bool {
        match self.entries.remove(id) {
            Some((_, e)) => {
                e.timer.abort();
                let _ = e.outcome.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Fail every pending entry with `RoomDestroyed`, cancelling its timer.
    pub fn fail_all(&self) -> usize {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut n = 0;
        for k in keys {
            if let Some((_, e)) = self.entries.remove(&k) {
                e.timer.abort();
                let _ = e.outcome.send(Err(PeerMailError::RoomDestroyed));
                n += 1;
            }
        }
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}
