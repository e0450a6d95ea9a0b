use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ConnectionId, OutboundMessage, Participant, RoomId, SignalingError};
use crate::translation::Translation;

/// Messages sent from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Create a room (or reuse an existing one) and become a participant
    CreateRoom {
        #[serde(default)]
        room_id: Option<RoomId>,
        name: String,
    },

    /// Join an existing room, carrying the joiner's offer
    JoinRoom {
        room_id: RoomId,
        signal_data: Value,
        from: String,
    },

    /// Answer a joiner, addressed by its connection id. Kept as text: an id
    /// that matches no live connection is dropped, not rejected.
    AnswerCall {
        signal: Value,
        to: String,
        room_id: RoomId,
    },

    /// End the call for everyone and delete the room
    EndCall { room_id: RoomId },

    /// Leave one room without closing the connection
    LeaveRoom { room_id: RoomId },

    /// Translate a transcript and share it with the room
    TranslateText {
        text: String,
        from: String,
        to: String,
        #[serde(default)]
        room_id: Option<RoomId>,
    },
}

impl ClientMessage {
    /// Parse an inbound text frame, rejecting unknown or incomplete shapes.
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(|e| SignalingError::InvalidMessage(e.to_string()))
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once after the WebSocket handshake
    Connected { connection_id: ConnectionId },

    /// Room created (or reused); sent to the creator only
    RoomCreated {
        room_id: RoomId,
        participants: Vec<Participant>,
    },

    /// Someone joined; sent to everyone else in the room
    UserJoined {
        signal: Value,
        from: String,
        connection_id: ConnectionId,
    },

    /// Answer delivered to the joiner
    RoomJoined { signal: Value },

    CallEnded,

    UserLeft {
        connection_id: ConnectionId,
        name: String,
    },

    TranslationResult(Translation),

    /// Error response
    Error { message: String },
}

impl ServerMessage {
    pub fn error(err: &SignalingError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    /// Serialize once into a frame that can be cloned cheaply per recipient.
    pub fn encode(&self) -> Result<OutboundMessage, SignalingError> {
        serde_json::to_string(self)
            .map(OutboundMessage::from)
            .map_err(|e| SignalingError::Internal(format!("encode failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn parse_create_room() {
        let msg = ClientMessage::parse(r#"{"type": "createRoom", "roomId": "ABC123", "name": "Alice"}"#)
            .unwrap();
        match msg {
            ClientMessage::CreateRoom { room_id, name } => {
                assert_eq!(room_id, Some(RoomId::from("ABC123")));
                assert_eq!(name, "Alice");
            }
            other => panic!("Expected CreateRoom, got {:?}", other),
        }
    }

    #[test]
    fn parse_create_room_without_id() {
        let msg = ClientMessage::parse(r#"{"type": "createRoom", "name": "Alice"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreateRoom { room_id: None, .. }));
    }

    #[test]
    fn parse_join_room() {
        let json = r#"{"type": "joinRoom", "roomId": "ABC123", "signalData": {"type": "offer"}, "from": "Bob"}"#;
        if let ClientMessage::JoinRoom {
            room_id,
            signal_data,
            from,
        } = ClientMessage::parse(json).unwrap()
        {
            assert_eq!(room_id.as_str(), "ABC123");
            assert_eq!(signal_data, json!({"type": "offer"}));
            assert_eq!(from, "Bob");
        } else {
            panic!("Expected JoinRoom");
        }
    }

    #[test]
    fn parse_answer_call() {
        let json = r#"{"type": "answerCall", "signal": {"type": "answer"}, "to": "conn_0011223344556677", "roomId": "ABC123"}"#;
        if let ClientMessage::AnswerCall { to, signal, .. } = ClientMessage::parse(json).unwrap() {
            assert_eq!(to, "conn_0011223344556677");
            assert_eq!(signal["type"], "answer");
        } else {
            panic!("Expected AnswerCall");
        }
    }

    #[test]
    fn parse_answer_call_with_foreign_target() {
        let json = r#"{"type": "answerCall", "signal": {}, "to": "conn_0123456789abcdef-stale", "roomId": "r1"}"#;
        if let ClientMessage::AnswerCall { to, .. } = ClientMessage::parse(json).unwrap() {
            assert_eq!(to, "conn_0123456789abcdef-stale");
        } else {
            panic!("Expected AnswerCall");
        }
    }

    #[test]
    fn parse_end_and_leave() {
        let end = ClientMessage::parse(r#"{"type": "endCall", "roomId": "r1"}"#).unwrap();
        assert!(matches!(end, ClientMessage::EndCall { .. }));
        let leave = ClientMessage::parse(r#"{"type": "leaveRoom", "roomId": "r1"}"#).unwrap();
        assert!(matches!(leave, ClientMessage::LeaveRoom { .. }));
    }

    #[test]
    fn parse_translate_text() {
        let json = r#"{"type": "translateText", "text": "hello", "from": "en", "to": "vi"}"#;
        if let ClientMessage::TranslateText { text, room_id, .. } = ClientMessage::parse(json).unwrap() {
            assert_eq!(text, "hello");
            assert!(room_id.is_none());
        } else {
            panic!("Expected TranslateText");
        }
    }

    #[test]
    fn reject_unknown_event() {
        let err = ClientMessage::parse(r#"{"type": "dance"}"#).unwrap_err();
        assert!(matches!(err, SignalingError::InvalidMessage(_)));
    }

    #[test]
    fn reject_missing_required_field() {
        assert!(ClientMessage::parse(r#"{"type": "joinRoom", "roomId": "r1", "from": "Bob"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type": "endCall"}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn serialize_room_created() {
        let msg = ServerMessage::RoomCreated {
            room_id: RoomId::from("ABC123"),
            participants: vec![Participant {
                connection_id: "conn_alice".parse().unwrap(),
                name: "Alice".to_string(),
                joined_at: Utc::now(),
            }],
        };
        let json: Value = serde_json::from_str(msg.encode().unwrap().as_str()).unwrap();
        assert_eq!(json["type"], "roomCreated");
        assert_eq!(json["roomId"], "ABC123");
        assert_eq!(json["participants"][0]["connectionId"], "conn_alice");
        assert_eq!(json["participants"][0]["name"], "Alice");
    }

    #[test]
    fn serialize_user_joined() {
        let msg = ServerMessage::UserJoined {
            signal: json!({"type": "offer"}),
            from: "Bob".to_string(),
            connection_id: "conn_bob".parse().unwrap(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"type": "userJoined", "signal": {"type": "offer"}, "from": "Bob", "connectionId": "conn_bob"})
        );
    }

    #[test]
    fn serialize_call_ended() {
        let json = serde_json::to_string(&ServerMessage::CallEnded).unwrap();
        assert_eq!(json, r#"{"type":"callEnded"}"#);
    }

    #[test]
    fn serialize_translation_result() {
        let msg = ServerMessage::TranslationResult(Translation {
            original_text: "hello".to_string(),
            translated_text: "xin chào".to_string(),
            source_lang: "en".to_string(),
            target_lang: "vi".to_string(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "translationResult");
        assert_eq!(json["originalText"], "hello");
        assert_eq!(json["translatedText"], "xin chào");
        assert_eq!(json["targetLang"], "vi");
    }

    #[test]
    fn serialize_error() {
        let msg = ServerMessage::error(&SignalingError::RoomNotFound(RoomId::from("XYZ")));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "error", "message": "Room XYZ does not exist"}));
    }
}
