use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use peermail_core::address::parse_address;
use peermail_core::error::{PeerMailError, Result};

use crate::room::{Delivery, RoomRegistry};
use crate::smtp::{Envelope, MailSink};

/// Resolves a recipient's room and hands the message to it. No retries:
/// failures are logged and left to whoever resubmits.
pub struct Router {
    rooms: Arc<RoomRegistry>,
    ack_timeout: Duration,
}

impl Router {
    pub fn new(rooms: Arc<RoomRegistry>, ack_timeout: Duration) -> Self {
        Self { rooms, ack_timeout }
    }

    /// Send one envelope under a fresh message id. Rooms are only ever
    /// created by the peer side; an unknown room has no peers.
    pub fn route(&self, envelope: &Envelope) -> Result<Delivery> {
        let to = parse_address(&envelope.to)?;
        let room = self.rooms.get(&to.room_id).ok_or(PeerMailError::NoPeers)?;
        let id = uuid::Uuid::new_v4().to_string();
        room.send_message(&id, envelope.raw.as_bytes(), self.ack_timeout)
    }
}

impl MailSink for Router {
    fn deliver(&self, envelope: Envelope) {
        let delivery = match self.route(&envelope) {
            Ok(d) => d,
            Err(e) => {
                warn!(to = %envelope.to, code = e.code().as_str(), error = %e, "outbound send failed");
                return;
            }
        };

        let id = delivery.id().to_string();
        let to = envelope.to;
        tokio::spawn(async move {
            match delivery.wait().await {
                Ok(()) => info!(id = %id, to = %to, "delivery acknowledged"),
                Err(e) => {
                    warn!(id = %id, to = %to, code = e.code().as_str(), error = %e, "delivery failed")
                }
            }
        });
    }
}
