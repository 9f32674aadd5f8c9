//! Persistent connection to the remote detector.
//!
//! A [`DetectionChannel`] represents a single connection attempt. It is
//! never reconnected: after a close or failure the session must open a
//! new channel on an explicit restart.

mod connection;
pub mod protocol;

pub use connection::{
    ChannelEvent, ChannelEventKind, ChannelId, ConnectionState, DetectionChannel, SendOutcome,
};
pub use protocol::{parse_inbound, Inbound, ProtocolError};
