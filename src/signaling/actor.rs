use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::gateway::Gateway;
use super::messages::ServerMessage;
use super::registry::RoomRegistry;
use super::types::{
    CallState, ConnectionId, OutboundMessage, Participant, RelayStats, RoomId, RoomSummary,
    SignalingError,
};
use crate::translation::Translation;

const COMMAND_BUFFER: usize = 1024;

/// Commands sent to the room manager actor
pub(crate) enum RoomCommand {
    Connect {
        tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Create {
        connection_id: ConnectionId,
        room_id: Option<RoomId>,
        name: String,
        reply: oneshot::Sender<Result<RoomId, SignalingError>>,
    },
    Join {
        connection_id: ConnectionId,
        room_id: RoomId,
        signal: Value,
        from: String,
        reply: oneshot::Sender<Result<Vec<Participant>, SignalingError>>,
    },
    Answer {
        connection_id: ConnectionId,
        to: ConnectionId,
        room_id: RoomId,
        signal: Value,
        reply: oneshot::Sender<Result<(), SignalingError>>,
    },
    End {
        connection_id: ConnectionId,
        room_id: RoomId,
    },
    Leave {
        connection_id: ConnectionId,
        room_id: RoomId,
    },
    Translated {
        connection_id: ConnectionId,
        room_id: Option<RoomId>,
        translation: Translation,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    ListRooms {
        reply: oneshot::Sender<Vec<RoomSummary>>,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
}

/// The signaling state machine. Applies one inbound event at a time to the
/// registry and emits the resulting frames through the gateway.
#[derive(Debug, Default)]
pub(crate) struct Relay {
    registry: RoomRegistry,
    gateway: Gateway,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, tx: mpsc::UnboundedSender<OutboundMessage>) -> ConnectionId {
        let connection_id = self.gateway.register(tx);
        let _ = self
            .gateway
            .send_to(&connection_id, &ServerMessage::Connected { connection_id });
        info!("Connection {} registered", connection_id);
        connection_id
    }

    pub fn create_room(
        &mut self,
        connection_id: ConnectionId,
        room_id: Option<RoomId>,
        name: &str,
    ) -> Result<RoomId, SignalingError> {
        if self.gateway.session(&connection_id).is_none() {
            return Err(SignalingError::ConnectionNotFound(connection_id.to_string()));
        }

        let room_id = self.registry.create_room(room_id, name);
        let participants = self
            .registry
            .add_participant(&room_id, connection_id, name)?
            .participants
            .to_vec();

        if let Some(session) = self.gateway.session_mut(&connection_id) {
            session.set_name(name);
            session.joined(room_id.clone());
        }

        self.gateway.send_to(
            &connection_id,
            &ServerMessage::RoomCreated {
                room_id: room_id.clone(),
                participants,
            },
        )?;
        Ok(room_id)
    }

    pub fn join_room(
        &mut self,
        connection_id: ConnectionId,
        room_id: &RoomId,
        signal: Value,
        from: &str,
    ) -> Result<Vec<Participant>, SignalingError> {
        if self.gateway.session(&connection_id).is_none() {
            return Err(SignalingError::ConnectionNotFound(connection_id.to_string()));
        }

        let (participants, inserted) =
            match self.registry.add_participant(room_id, connection_id, from) {
                Ok(admission) => (admission.participants.to_vec(), admission.inserted),
                Err(e) => {
                    let _ = self.gateway.send_to(&connection_id, &ServerMessage::error(&e));
                    return Err(e);
                }
            };

        // A repeated join from a member is not a new arrival.
        if !inserted {
            debug!("Ignoring repeated joinRoom from {} in {}", connection_id, room_id);
            return Ok(participants);
        }

        if let Some(session) = self.gateway.session_mut(&connection_id) {
            session.set_name(from);
            session.joined(room_id.clone());
        }
        self.registry.set_state(room_id, CallState::Ringing);
        info!("User {} joined room {}", from, room_id);

        if let Some(room) = self.registry.get(room_id) {
            let joined = ServerMessage::UserJoined {
                signal,
                from: from.to_owned(),
                connection_id,
            };
            let notified = self.gateway.send_to_room_except(room, &connection_id, &joined);
            debug!("userJoined for {} sent to {} participant(s)", connection_id, notified);
        }
        Ok(participants)
    }

    pub fn answer_call(
        &mut self,
        connection_id: ConnectionId,
        to: ConnectionId,
        room_id: &RoomId,
        signal: Value,
    ) -> Result<(), SignalingError> {
        self.gateway.send_to(&to, &ServerMessage::RoomJoined { signal })?;
        if self.registry.set_state(room_id, CallState::Active) {
            info!("Call answered in room {} by {}", room_id, connection_id);
        }
        Ok(())
    }

    pub fn end_call(&mut self, connection_id: ConnectionId, room_id: &RoomId) {
        let Some(room) = self.registry.delete_room(room_id) else {
            debug!("endCall from {} for unknown room {}", connection_id, room_id);
            return;
        };

        self.gateway.send_to_room_all(&room, &ServerMessage::CallEnded);
        for participant in room.participants() {
            if let Some(session) = self.gateway.session_mut(&participant.connection_id) {
                session.left(room_id);
            }
        }
        info!("Call ended in room {} by {}", room_id, connection_id);
    }

    pub fn leave_room(&mut self, connection_id: ConnectionId, room_id: &RoomId) {
        if let Some(session) = self.gateway.session_mut(&connection_id) {
            session.left(room_id);
        }
        self.remove_member(connection_id, room_id);
    }

    /// Drop the connection and clean up every room it was in.
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        let Some(session) = self.gateway.unregister(&connection_id) else {
            return;
        };
        let name = session.name().unwrap_or("unnamed").to_owned();
        for room_id in session.into_rooms() {
            self.remove_member(connection_id, &room_id);
        }
        info!("Connection {} ({}) removed", connection_id, name);
    }

    /// Tolerates the participant or the whole room already being gone.
    fn remove_member(&mut self, connection_id: ConnectionId, room_id: &RoomId) {
        let Some(participant) = self.registry.remove_participant(room_id, &connection_id) else {
            debug!("{} was no longer in room {}", connection_id, room_id);
            return;
        };
        info!("User {} left room {}", participant.name, room_id);

        if let Some(room) = self.registry.get(room_id) {
            let left = ServerMessage::UserLeft {
                connection_id,
                name: participant.name,
            };
            self.gateway.send_to_room_all(room, &left);
        }
    }

    pub fn relay_translation(
        &mut self,
        connection_id: ConnectionId,
        room_id: Option<&RoomId>,
        translation: Translation,
    ) {
        let msg = ServerMessage::TranslationResult(translation);
        let _ = self.gateway.send_to(&connection_id, &msg);

        if let Some(room) = room_id.and_then(|id| self.registry.get(id)) {
            self.gateway.send_to_room_except(room, &connection_id, &msg);
        }
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.registry.list_rooms()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            rooms: self.registry.len(),
            connections: self.gateway.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &RoomRegistry {
        &self.registry
    }
}

pub(crate) async fn room_manager_actor(mut rx: mpsc::Receiver<RoomCommand>) {
    let mut relay = Relay::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RoomCommand::Connect { tx, reply } => {
                let _ = reply.send(relay.connect(tx));
            }

            RoomCommand::Create {
                connection_id,
                room_id,
                name,
                reply,
            } => {
                let _ = reply.send(relay.create_room(connection_id, room_id, &name));
            }

            RoomCommand::Join {
                connection_id,
                room_id,
                signal,
                from,
                reply,
            } => {
                let _ = reply.send(relay.join_room(connection_id, &room_id, signal, &from));
            }

            RoomCommand::Answer {
                connection_id,
                to,
                room_id,
                signal,
                reply,
            } => {
                let _ = reply.send(relay.answer_call(connection_id, to, &room_id, signal));
            }

            RoomCommand::End {
                connection_id,
                room_id,
            } => relay.end_call(connection_id, &room_id),

            RoomCommand::Leave {
                connection_id,
                room_id,
            } => relay.leave_room(connection_id, &room_id),

            RoomCommand::Translated {
                connection_id,
                room_id,
                translation,
            } => relay.relay_translation(connection_id, room_id.as_ref(), translation),

            RoomCommand::Disconnect { connection_id } => relay.disconnect(connection_id),

            RoomCommand::ListRooms { reply } => {
                let _ = reply.send(relay.list_rooms());
            }

            RoomCommand::Stats { reply } => {
                let _ = reply.send(relay.stats());
            }
        }
    }
}

fn actor_closed<T>(_: T) -> SignalingError {
    SignalingError::Internal("actor channel closed".to_string())
}

/// Handle to communicate with the room manager actor
#[derive(Clone)]
pub struct RoomManagerHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
}

impl RoomManagerHandle {
    /// Spawn the room manager actor on the current runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<RoomCommand>(COMMAND_BUFFER);
        tokio::spawn(room_manager_actor(rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(actor_closed)?;
        reply_rx.await.map_err(actor_closed)
    }

    async fn notify(&self, cmd: RoomCommand) {
        let _ = self.tx.send(cmd).await;
    }

    /// Register a new connection; it is sent `connected` with its id.
    pub async fn connect(
        &self,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ConnectionId, SignalingError> {
        self.request(|reply| RoomCommand::Connect { tx, reply }).await
    }

    /// Create (or reuse) a room and join it as the first participant
    pub async fn create_room(
        &self,
        connection_id: ConnectionId,
        room_id: Option<RoomId>,
        name: String,
    ) -> Result<RoomId, SignalingError> {
        self.request(|reply| RoomCommand::Create {
            connection_id,
            room_id,
            name,
            reply,
        })
        .await?
    }

    /// Join an existing room, relaying `signal` to the other participants
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        signal: Value,
        from: String,
    ) -> Result<Vec<Participant>, SignalingError> {
        self.request(|reply| RoomCommand::Join {
            connection_id,
            room_id,
            signal,
            from,
            reply,
        })
        .await?
    }

    /// Deliver an answer to the connection `to`
    pub async fn answer_call(
        &self,
        connection_id: ConnectionId,
        to: ConnectionId,
        room_id: RoomId,
        signal: Value,
    ) -> Result<(), SignalingError> {
        self.request(|reply| RoomCommand::Answer {
            connection_id,
            to,
            room_id,
            signal,
            reply,
        })
        .await?
    }

    pub async fn end_call(&self, connection_id: ConnectionId, room_id: RoomId) {
        self.notify(RoomCommand::End {
            connection_id,
            room_id,
        })
        .await;
    }

    pub async fn leave_room(&self, connection_id: ConnectionId, room_id: RoomId) {
        self.notify(RoomCommand::Leave {
            connection_id,
            room_id,
        })
        .await;
    }

    pub async fn relay_translation(
        &self,
        connection_id: ConnectionId,
        room_id: Option<RoomId>,
        translation: Translation,
    ) {
        self.notify(RoomCommand::Translated {
            connection_id,
            room_id,
            translation,
        })
        .await;
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.notify(RoomCommand::Disconnect { connection_id }).await;
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, SignalingError> {
        self.request(|reply| RoomCommand::ListRooms { reply }).await
    }

    pub async fn stats(&self) -> Result<RelayStats, SignalingError> {
        self.request(|reply| RoomCommand::Stats { reply }).await
    }
}
