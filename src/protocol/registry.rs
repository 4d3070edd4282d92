//! Decoder registry
//!
//! Maps a message type to the routine that decodes its fields. A registry is
//! built once from a list of `(type, decoder)` pairs and never changes
//! afterwards, so a shared reference can be handed to any number of receive
//! workers.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::messages::{AnyMessage, STANDARD_DECODERS};
use super::{CodecError, CodecResult, Message, MessageType, Packet};

/// Decodes the fields of one message type; the identifier is already read.
pub type DecodeFn = fn(&mut Packet) -> CodecResult<AnyMessage>;

/// Adapter from a typed [`Message::decode`] to a [`DecodeFn`].
pub fn decode_as<M>(packet: &mut Packet) -> CodecResult<AnyMessage>
where
    M: Message + Into<AnyMessage>,
{
    M::decode(packet).map(Into::into)
}

#[derive(Debug, Clone)]
pub struct Registry {
    decoders: HashMap<MessageType, DecodeFn>,
}

impl Registry {
    /// Build a registry. When a type appears twice the first entry wins.
    pub fn from_entries(entries: &[(MessageType, DecodeFn)]) -> Self {
        let mut decoders = HashMap::with_capacity(entries.len());
        for &(message_type, decode) in entries {
            if decoders.contains_key(&message_type) {
                tracing::warn!(%message_type, "duplicate decoder ignored");
                continue;
            }
            decoders.insert(message_type, decode);
        }
        Self { decoders }
    }

    /// The process-wide registry of every [`AnyMessage`] variant.
    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(|| Registry::from_entries(STANDARD_DECODERS))
    }

    pub fn get(&self, message_type: MessageType) -> Option<DecodeFn> {
        self.decoders.get(&message_type).copied()
    }

    pub fn contains(&self, message_type: MessageType) -> bool {
        self.decoders.contains_key(&message_type)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Registered types, in no particular order
    pub fn message_types(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.decoders.keys().copied()
    }

    /// Decode the fields of a `message_type` message from `packet`.
    ///
    /// An unregistered type yields [`CodecError::UnknownMessageType`]; the
    /// packet is left where the identifier ended.
    pub fn decode(&self, message_type: MessageType, packet: &mut Packet) -> CodecResult<AnyMessage> {
        let decode = self
            .get(message_type)
            .ok_or(CodecError::UnknownMessageType(message_type))?;
        decode(packet)
    }
}
