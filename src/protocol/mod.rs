//! Protocol module - Defines the wire protocol for grid circuits
//!
//! Every datagram is a [`Packet`]:
//! - 1 byte header flags
//! - 4 bytes sequence number (big-endian)
//! - 1 byte extra header length, then the extra header
//! - Body: tiered message type identifier, then the message fields,
//!   optionally zero run-length encoded
//! - Optional trailer of piggy-backed ack sequence numbers

mod acks;
mod codec;
mod error;
mod fields;
mod message;
mod message_type;
mod messages;
mod packet;
mod registry;
pub mod types;
pub mod zerocode;

pub use acks::MAX_ACKS;
pub use codec::*;
pub use error::*;
pub use fields::NetworkOrder;
pub use message::Message;
pub use message_type::*;
pub use messages::*;
pub use packet::*;
pub use registry::*;

/// Default port for circuit traffic
pub const DEFAULT_PORT: u16 = 13000;
