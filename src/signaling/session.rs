use std::collections::HashSet;

use tokio::sync::mpsc;

use super::types::{ConnectionId, OutboundMessage, RoomId};

/// Per-connection state held by the relay for one live WebSocket.
///
/// `rooms` is the reverse index used on disconnect: every room this
/// connection currently has a participant entry in.
#[derive(Debug)]
pub struct ConnectionSession {
    id: ConnectionId,
    name: Option<String>,
    rooms: HashSet<RoomId>,
    /// Channel for outbound messages to this connection.
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ConnectionSession {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            id,
            name: None,
            rooms: HashSet::new(),
            tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Display name from the last create/join, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_owned());
    }

    pub fn joined(&mut self, room_id: RoomId) {
        self.rooms.insert(room_id);
    }

    pub fn left(&mut self, room_id: &RoomId) -> bool {
        self.rooms.remove(room_id)
    }

    pub fn into_rooms(self) -> HashSet<RoomId> {
        self.rooms
    }

    /// Queue a frame for the writer task. `false` once the socket is gone.
    pub fn deliver(&self, msg: OutboundMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}
