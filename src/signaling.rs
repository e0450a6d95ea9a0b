//! WebSocket signaling relay for peer-to-peer calls

mod actor;
mod gateway;
mod messages;
mod registry;
mod server;
mod session;
mod types;

pub use actor::RoomManagerHandle;
pub use gateway::Gateway;
pub use messages::{ClientMessage, ServerMessage};
pub use registry::{Room, RoomRegistry};
pub use server::{DEFAULT_PING_INTERVAL, DEFAULT_SIGNALING_PORT, SignalingServer};
pub use session::ConnectionSession;
pub use types::{
    CallState, ConnectionId, OutboundMessage, Participant, RelayStats, RoomId, RoomSummary,
    SignalingError,
};
