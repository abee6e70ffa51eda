use peermail_core::address::RoomId;

/// Substrate-assigned peer identity (e.g. remote key or socket address).
pub type PeerId = String;

/// Connect/disconnect notifications from the discovery substrate.
pub enum PeerEvent<S> {
    Connected { peer: PeerId, stream: S },
    Disconnected { peer: PeerId },
}

/// Room -> owning pipeline notifications, in per-stream arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// Inbound MESSAGE. Not acknowledged until the consumer calls `send_ack`.
    Message {
        room: RoomId,
        peer: PeerId,
        id: String,
        raw: Vec<u8>,
    },
    /// Inbound ACK. `settled` is false when no send was waiting for `id`.
    Ack {
        room: RoomId,
        peer: PeerId,
        id: String,
        settled: bool,
    },
    PeerJoined {
        room: RoomId,
        peer: PeerId,
    },
    PeerLeft {
        room: RoomId,
        peer: PeerId,
    },
    /// Stream failure; the room itself keeps running.
    PeerError {
        room: RoomId,
        peer: PeerId,
        error: String,
    },
}
