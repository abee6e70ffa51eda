use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use peermail_core::address::RoomId;

use super::peer_room::Room;
use super::types::RoomEvent;

/// room id -> live room. All rooms report into one event channel.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Room>,
    events: mpsc::Sender<RoomEvent>,
}

impl RoomRegistry {
    pub fn new(events: mpsc::Sender<RoomEvent>) -> Self {
        Self {
            rooms: DashMap::new(),
            events,
        }
    }

    pub fn get(&self, id: &RoomId) -> Option<Room> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// Existing room, or a fresh one if absent (or previously destroyed).
    pub fn get_or_create(&self, id: &RoomId) -> Room {
        let mut entry = self
            .rooms
            .entry(id.clone())
            .or_insert_with(|| Room::new(id.clone(), self.events.clone()));
        if entry.is_destroyed() {
            *entry = Room::new(id.clone(), self.events.clone());
        }
        if entry.peer_count() == 0 {
            debug!(room = %id, "room has no peers yet");
        }
        entry.value().clone()
    }

    pub fn ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }

    /// Destroy and forget one room.
    pub fn destroy(&self, id: &RoomId) -> bool {
        match self.rooms.remove(id) {
            Some((_, room)) => {
                room.destroy();
                true
            }
            None => false,
        }
    }

    /// Destroy every room (shutdown path).
    pub fn destroy_all(&self) {
        for id in self.ids() {
            self.destroy(&id);
        }
    }
}
