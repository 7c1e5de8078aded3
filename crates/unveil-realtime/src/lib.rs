// Realtime channel: one authenticated WebSocket per session, with match
// rooms, event fan-out to registered listeners, and bounded reconnection.

pub mod bus;
pub mod channel;
mod connection;
pub mod rooms;

pub use bus::{EventBus, ListenerId};
pub use channel::{
    ChannelConfig, ConnectionState, DisconnectReason, EmitStatus, RealtimeChannel,
};
pub use rooms::{RoomInfo, RoomTracker};
