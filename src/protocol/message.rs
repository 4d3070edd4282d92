//! Message contract
//!
//! Every concrete message knows its identifier, whether it is zero coded when
//! sent, and how to write and read its fields. Field order in
//! [`Message::write_fields`] must match [`Message::decode`] exactly.

use super::{CodecResult, MessageType, Packet, Priority};

pub trait Message: Sized {
    /// Identifier, constant per type
    const TYPE: MessageType;

    /// Whether packets carrying this message are zero coded
    const ZERO_CODED: bool = false;

    /// Write the fields, not the identifier.
    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()>;

    /// Read the fields. The identifier has already been consumed.
    fn decode(packet: &mut Packet) -> CodecResult<Self>;

    /// Write the identifier followed by the fields.
    fn serialize(&self, packet: &mut Packet) -> CodecResult<()> {
        Self::TYPE.encode(packet)?;
        self.write_fields(packet)
    }

    fn message_type(&self) -> MessageType {
        Self::TYPE
    }

    fn priority(&self) -> Priority {
        Self::TYPE.priority()
    }
}

/// Write a block count prefix, rejecting lists the u8 cannot describe.
pub(crate) fn write_block_count(packet: &mut Packet, len: usize) -> CodecResult<()> {
    let count = u8::try_from(len).map_err(|_| super::CodecError::TooManyBlocks(len))?;
    packet.write_u8(count)
}
