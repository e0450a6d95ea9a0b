//! Delivery side of the transport: live connections and the three send
//! primitives the relay uses.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::messages::ServerMessage;
use super::registry::Room;
use super::session::ConnectionSession;
use super::types::{ConnectionId, OutboundMessage, SignalingError};

#[derive(Debug, Default)]
pub struct Gateway {
    sessions: HashMap<ConnectionId, ConnectionSession>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a fresh connection id and start tracking its session.
    pub fn register(&mut self, tx: mpsc::UnboundedSender<OutboundMessage>) -> ConnectionId {
        let id = loop {
            let id = ConnectionId::generate();
            if !self.sessions.contains_key(&id) {
                break id;
            }
        };
        self.sessions.insert(id, ConnectionSession::new(id, tx));
        id
    }

    pub fn unregister(&mut self, id: &ConnectionId) -> Option<ConnectionSession> {
        self.sessions.remove(id)
    }

    pub fn session(&self, id: &ConnectionId) -> Option<&ConnectionSession> {
        self.sessions.get(id)
    }

    pub fn session_mut(&mut self, id: &ConnectionId) -> Option<&mut ConnectionSession> {
        self.sessions.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// send-to-one. `ConnectionNotFound` if the connection is gone.
    pub fn send_to(&self, id: &ConnectionId, msg: &ServerMessage) -> Result<(), SignalingError> {
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| SignalingError::ConnectionNotFound(id.to_string()))?;
        if !session.deliver(msg.encode()?) {
            debug!("Dropping message for closed connection {}", id);
        }
        Ok(())
    }

    /// send-to-room-except-self
    pub fn send_to_room_except(&self, room: &Room, sender: &ConnectionId, msg: &ServerMessage) -> usize {
        self.send_to_room(room, Some(sender), msg)
    }

    /// send-to-room-all
    pub fn send_to_room_all(&self, room: &Room, msg: &ServerMessage) -> usize {
        self.send_to_room(room, None, msg)
    }

    /// Best effort: participants whose connection is gone are skipped.
    fn send_to_room(&self, room: &Room, except: Option<&ConnectionId>, msg: &ServerMessage) -> usize {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Room {} broadcast dropped: {}", room.id(), e);
                return 0;
            }
        };

        room.participants()
            .iter()
            .filter(|p| Some(&p.connection_id) != except)
            .filter_map(|p| self.sessions.get(&p.connection_id))
            .filter(|session| session.deliver(frame.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::registry::RoomRegistry;
    use crate::signaling::types::RoomId;

    fn connect(gateway: &mut Gateway) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (gateway.register(tx), rx)
    }

    #[test]
    fn register_assigns_distinct_ids() {
        let mut gateway = Gateway::new();
        let (a, _ra) = connect(&mut gateway);
        let (b, _rb) = connect(&mut gateway);
        assert_ne!(a, b);
        assert_eq!(gateway.len(), 2);
        assert!(gateway.unregister(&a).is_some());
        assert!(gateway.unregister(&a).is_none());
        assert_eq!(gateway.len(), 1);
    }

    #[test]
    fn send_to_unknown_connection_fails() {
        let gateway = Gateway::new();
        let ghost = ConnectionId::generate();
        let err = gateway.send_to(&ghost, &ServerMessage::CallEnded).unwrap_err();
        assert!(matches!(err, SignalingError::ConnectionNotFound(id) if id == ghost.as_str()));
    }

    #[test]
    fn room_broadcasts_respect_sender() {
        let mut gateway = Gateway::new();
        let (alice, mut alice_rx) = connect(&mut gateway);
        let (bob, mut bob_rx) = connect(&mut gateway);

        let mut registry = RoomRegistry::new();
        let id = registry.create_room(Some(RoomId::from("r1")), "Alice");
        registry.add_participant(&id, alice, "Alice").unwrap();
        registry.add_participant(&id, bob, "Bob").unwrap();
        let room = registry.get(&id).unwrap();

        assert_eq!(gateway.send_to_room_except(room, &bob, &ServerMessage::CallEnded), 1);
        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_err());

        assert_eq!(gateway.send_to_room_all(room, &ServerMessage::CallEnded), 2);
        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_ok());
    }

    #[test]
    fn room_broadcast_skips_departed_connections() {
        let mut gateway = Gateway::new();
        let (alice, _alice_rx) = connect(&mut gateway);
        let (bob, bob_rx) = connect(&mut gateway);
        drop(bob_rx);

        let mut registry = RoomRegistry::new();
        let id = registry.create_room(Some(RoomId::from("r1")), "Alice");
        registry.add_participant(&id, alice, "Alice").unwrap();
        registry.add_participant(&id, bob, "Bob").unwrap();
        registry.add_participant(&id, ConnectionId::generate(), "Ghost").unwrap();

        let delivered = gateway.send_to_room_all(registry.get(&id).unwrap(), &ServerMessage::CallEnded);
        assert_eq!(delivered, 1);
    }
}
