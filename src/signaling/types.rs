use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling relay errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("Room {0} does not exist")]
    RoomNotFound(RoomId),

    /// Unknown or malformed connection id, kept as the text the client sent.
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

const ROOM_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ROOM_ID_LEN: usize = 6;
const CONNECTION_ID_PREFIX: &[u8] = b"conn_";
const CONNECTION_ID_LEN: usize = 21;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Room identifier. Either supplied by the creating client or generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Short random token, `ROOM_ID_LEN` chars of `[a-z0-9]`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..ROOM_ID_LEN)
            .map(|_| ROOM_ID_CHARS[rng.random_range(0..ROOM_ID_CHARS.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids count as "not supplied".
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Connection ID: 21-byte fixed array ("conn_" + 16 hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    bytes: [u8; CONNECTION_ID_LEN],
    len: u8,
}

impl ConnectionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        let prefix = CONNECTION_ID_PREFIX.len();
        bytes[..prefix].copy_from_slice(CONNECTION_ID_PREFIX);

        let value: u64 = rand::rng().random();
        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            bytes[prefix + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CONNECTION_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionId {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let src = s.as_bytes();
        if src.is_empty() || src.len() > CONNECTION_ID_LEN {
            return Err(SignalingError::InvalidMessage(format!(
                "malformed connection id: {s:?}"
            )));
        }
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        bytes[..src.len()].copy_from_slice(src);
        Ok(Self {
            bytes,
            len: src.len() as u8,
        })
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A connection's membership record within a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

/// Progress of the call held in a room. `Ended` has no variant: an ended
/// call's room is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    #[default]
    Idle,
    Ringing,
    Active,
}

/// Read-only view of a room for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub rooms: usize,
    pub connections: usize,
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_generate_has_correct_length() {
        let id = RoomId::generate();
        assert_eq!(id.as_str().len(), 6);
    }

    #[test]
    fn room_id_generate_uses_valid_chars() {
        let id = RoomId::generate();
        for c in id.as_str().chars() {
            assert!(
                c.is_ascii_lowercase() || c.is_ascii_digit(),
                "Invalid char: {}",
                c
            );
        }
    }

    #[test]
    fn room_id_keeps_caller_supplied_value() {
        let id = RoomId::from("ABC123-a-much-longer-room-name");
        assert_eq!(id.as_str(), "ABC123-a-much-longer-room-name");
        assert!(!id.is_blank());
        assert!(RoomId::from("  ").is_blank());
    }

    #[test]
    fn connection_id_generate_has_correct_format() {
        let id = ConnectionId::generate();
        assert!(id.as_str().starts_with("conn_"));
        assert_eq!(id.as_str().len(), 21);
    }

    #[test]
    fn connection_id_round_trips_through_str() {
        let id = ConnectionId::generate();
        let parsed: ConnectionId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(format!("{}", parsed), id.as_str());
    }

    #[test]
    fn connection_id_rejects_oversized_input() {
        assert!("conn_0123456789abcdef0".parse::<ConnectionId>().is_err());
        assert!("".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn connection_id_serialization() {
        let id: ConnectionId = "conn_test".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn_test\"");
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn connection_id_is_copy() {
        let id = ConnectionId::generate();
        let copy = id;
        assert_eq!(id.as_str(), copy.as_str());
    }

    #[test]
    fn room_not_found_message_names_the_room() {
        let err = SignalingError::RoomNotFound(RoomId::from("ABC123"));
        assert_eq!(err.to_string(), "Room ABC123 does not exist");
    }

    #[test]
    fn room_summary_uses_camel_case() {
        let summary = RoomSummary {
            id: RoomId::from("abc"),
            participant_count: 2,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["participantCount"], 2);
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn call_state_defaults_to_idle() {
        assert_eq!(CallState::default(), CallState::Idle);
        assert_eq!(serde_json::to_string(&CallState::Ringing).unwrap(), "\"ringing\"");
    }
}
