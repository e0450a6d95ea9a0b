//! Room registry: the only owner of room membership.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::types::{CallState, ConnectionId, Participant, RoomId, RoomSummary, SignalingError};

#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    /// Join order.
    participants: Vec<Participant>,
    created_at: DateTime<Utc>,
    created_by: String,
    state: CallState,
}

impl Room {
    fn new(id: RoomId, created_by: &str) -> Self {
        Self {
            id,
            participants: Vec::new(),
            created_at: Utc::now(),
            created_by: created_by.to_owned(),
            state: CallState::Idle,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.participants
            .iter()
            .any(|p| p.connection_id == *connection_id)
    }

    fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            participant_count: self.participants.len(),
            created_at: self.created_at,
        }
    }
}

/// Outcome of [`RoomRegistry::add_participant`].
#[derive(Debug)]
pub struct Admission<'a> {
    pub participants: &'a [Participant],
    /// `false` when the connection was already in the room.
    pub inserted: bool,
}

/// Mapping from room id to room state.
///
/// Not synchronised on its own: it is owned by the room manager actor, which
/// applies every command to completion before taking the next one.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room, or look up an existing one with the same id.
    ///
    /// A missing or blank `id` gets a fresh generated token. Creating over an
    /// existing id leaves its participants untouched.
    pub fn create_room(&mut self, id: Option<RoomId>, creator_name: &str) -> RoomId {
        let id = match id {
            Some(id) if !id.is_blank() => id,
            _ => self.unused_id(),
        };

        self.rooms.entry(id.clone()).or_insert_with(|| {
            info!("Room created: {} by {}", id, creator_name);
            Room::new(id.clone(), creator_name)
        });
        id
    }

    fn unused_id(&self) -> RoomId {
        loop {
            let id = RoomId::generate();
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    /// Append a participant and return the updated list with whether an
    /// entry was actually added.
    ///
    /// Never creates the room. A connection already present is not added a
    /// second time.
    pub fn add_participant(
        &mut self,
        room_id: &RoomId,
        connection_id: ConnectionId,
        name: &str,
    ) -> Result<Admission<'_>, SignalingError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.clone()))?;

        let inserted = !room.contains(&connection_id);
        if inserted {
            room.participants.push(Participant {
                connection_id,
                name: name.to_owned(),
                joined_at: Utc::now(),
            });
        } else {
            debug!("{} already in room {}", connection_id, room_id);
        }
        Ok(Admission {
            participants: &room.participants,
            inserted,
        })
    }

    /// Remove a participant by connection id, deleting the room if that
    /// leaves it empty. `None` if the room or the participant is already gone.
    pub fn remove_participant(
        &mut self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> Option<Participant> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room
            .participants
            .iter()
            .position(|p| p.connection_id == *connection_id)?;
        let removed = room.participants.remove(index);

        if room.participants.is_empty() {
            self.rooms.remove(room_id);
            info!("Room {} deleted (empty)", room_id);
        }
        Some(removed)
    }

    /// Unconditional removal.
    pub fn delete_room(&mut self, room_id: &RoomId) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        info!("Room {} deleted", room_id);
        Some(room)
    }

    pub fn set_state(&mut self, room_id: &RoomId, state: CallState) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(room) => {
                if room.state != state {
                    debug!("Room {} {:?} -> {:?}", room_id, room.state, state);
                    room.state = state;
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Summaries ordered by creation time.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self.rooms.values().map(Room::summary).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
