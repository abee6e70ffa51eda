//! Peer rooms: per-room peer set plus reliable, ack-based delivery.
//!
//! A room is keyed by a 64-hex id whose binary form is the discovery topic.
//! Peers are plain byte streams handed over by whatever substrate found them;
//! the room frames them as newline-delimited JSON packets.

mod peer_room;
mod pending;
mod registry;
mod types;

pub use peer_room::{Delivery, Room};
pub use pending::PendingAcks;
pub use registry::RoomRegistry;
pub use types::{PeerEvent, PeerId, RoomEvent};
