use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use peermail_core::address::RoomId;
use peermail_core::error::Result;
use peermail_core::mail::{bare_address, header_value};

use crate::gate::{GateDecision, GateEngine, GateEntry, Whitelist};
use crate::mailbox::Mailbox;
use crate::room::{RoomEvent, RoomRegistry};

/// A message no rule decided on, parked for manual review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldMessage {
    pub id: String,
    pub room: RoomId,
    pub from: String,
    pub subject: String,
    pub raw: Vec<u8>,
}

pub struct InboundPipeline {
    rooms: Arc<RoomRegistry>,
    gate: Arc<GateEngine>,
    whitelist: Arc<Whitelist>,
    mailbox: Arc<dyn Mailbox>,
    held: DashMap<String, HeldMessage>,
}

/// Build the gate view of a raw message from its headers.
pub fn gate_entry(raw: &str) -> GateEntry {
    let from = header_value(raw, "From")
        .map(|v| bare_address(&v).to_string())
        .unwrap_or_default();
    GateEntry {
        from,
        subject: header_value(raw, "Subject").unwrap_or_default(),
        content_type: header_value(raw, "Content-Type"),
    }
}

impl InboundPipeline {
    pub fn new(
        rooms: Arc<RoomRegistry>,
        gate: Arc<GateEngine>,
        whitelist: Arc<Whitelist>,
        mailbox: Arc<dyn Mailbox>,
    ) -> Self {
        Self {
            rooms,
            gate,
            whitelist,
            mailbox,
            held: DashMap::new(),
        }
    }

    /// Consume room events until every sender is gone.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<RoomEvent>) {
        while let Some(ev) = events.recv().await {
            self.handle_event(ev).await;
        }
        debug!("inbound pipeline stopped");
    }

    /// Returns the gate decision for MESSAGE events, `None` otherwise.
    pub async fn handle_event(&self, ev: RoomEvent) -> Option<GateDecision> {
        match ev {
            RoomEvent::Message { room, peer, id, raw } => {
                debug!(room = %room, peer = %peer, id = %id, "inbound message");
                Some(self.accept_message(room, id, raw).await)
            }
            RoomEvent::Ack { room, id, settled, .. } => {
                if !settled {
                    debug!(room = %room, id = %id, "ack for unknown id ignored");
                }
                None
            }
            RoomEvent::PeerError { room, peer, error } => {
                warn!(room = %room, peer = %peer, error = %error, "peer stream error");
                None
            }
            RoomEvent::PeerJoined { .. } | RoomEvent::PeerLeft { .. } => None,
        }
    }

    async fn accept_message(&self, room: RoomId, id: String, raw: Vec<u8>) -> GateDecision {
        let text = String::from_utf8_lossy(&raw).into_owned();
        let entry = gate_entry(&text);
        let decision = self.decide(entry.clone(), text).await;

        match decision {
            GateDecision::Accept => {
                if let Err(e) = self.mailbox.store_message(&id, raw).await {
                    // no ack: the sender times out and may resubmit
                    warn!(id = %id, error = %e, "mailbox store failed");
                    return decision;
                }
                info!(room = %room, id = %id, from = %entry.from, "message accepted");
                self.ack(&room, &id);
            }
            GateDecision::Reject => {
                info!(room = %room, id = %id, from = %entry.from, "message rejected by gate");
            }
            GateDecision::Pending => {
                info!(room = %room, id = %id, from = %entry.from, "message held for review");
                self.held.insert(
                    id.clone(),
                    HeldMessage {
                        id: id.clone(),
                        room: room.clone(),
                        from: entry.from,
                        subject: entry.subject,
                        raw,
                    },
                );
                self.ack(&room, &id);
            }
        }
        decision
    }

    /// Whitelist then rules. Both consult file-backed stores, so the work
    /// runs on the blocking pool.
    async fn decide(&self, entry: GateEntry, text: String) -> GateDecision {
        let gate = Arc::clone(&self.gate);
        let whitelist = Arc::clone(&self.whitelist);
        let verdict = tokio::task::spawn_blocking(move || {
            if !entry.from.is_empty() && whitelist.is_allowed(&entry.from) {
                GateDecision::Accept
            } else {
                gate.evaluate(&entry, &text)
            }
        })
        .await;
        match verdict {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "gate evaluation task failed; holding message");
                GateDecision::Pending
            }
        }
    }

    fn ack(&self, room: &RoomId, id: &str) {
        match self.rooms.get(room) {
            Some(r) => {
                if let Err(e) = r.send_ack(id) {
                    warn!(room = %room, id = %id, error = %e, "ack encode failed");
                }
            }
            None => debug!(room = %room, id = %id, "room gone; ack skipped"),
        }
    }

    pub fn held(&self) -> Vec<HeldMessage> {
        self.held.iter().map(|h| h.value().clone()).collect()
    }

    /// Move a held message into the mailbox. `Ok(false)` if unknown.
    pub async fn release_held(&self, id: &str) -> Result<bool> {
        let Some((_, msg)) = self.held.remove(id) else {
            return Ok(false);
        };
        if let Err(e) = self.mailbox.store_message(&msg.id, msg.raw.clone()).await {
            self.held.insert(msg.id.clone(), msg);
            return Err(e);
        }
        Ok(true)
    }

    pub fn discard_held(&self, id: &str) -> bool {
        self.held.remove(id).is_some()
    }
}
