//! Protocol codec for encoding/decoding messages
//!
//! Wraps the packet, trailer and registry pieces into the two paths a circuit
//! uses: an [`Encoder`] that turns a message into a flushed datagram, and a
//! [`Decoder`] that turns a datagram back into a [`Frame`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{AnyMessage, CodecResult, MessageType, Packet, Registry, MAX_PACKET_SIZE};

/// When outbound packets are zero coded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroCoding {
    /// Follow each message type's own policy
    #[default]
    Auto,
    Always,
    Never,
}

impl ZeroCoding {
    pub fn applies(self, message_prefers: bool) -> bool {
        match self {
            ZeroCoding::Auto => message_prefers,
            ZeroCoding::Always => true,
            ZeroCoding::Never => false,
        }
    }
}

/// Header fields and piggy-backed acks of an inbound datagram.
///
/// Available even when the message itself cannot be decoded, so a receiver
/// can still acknowledge the packet and process its acks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub sequence: u32,
    pub reliable: bool,
    pub resent: bool,
    pub zero_coded: bool,
    pub extra_header: Vec<u8>,
    /// Acks piggy-backed on this datagram
    pub acks: Vec<u32>,
}

impl Envelope {
    fn read(packet: &mut Packet) -> CodecResult<Self> {
        let acks = packet.take_acks()?.unwrap_or_default();
        Ok(Self {
            sequence: packet.sequence(),
            reliable: packet.is_reliable(),
            resent: packet.is_resent(),
            zero_coded: packet.is_zero_coded(),
            extra_header: packet.extra_header().to_vec(),
            acks,
        })
    }

    pub fn into_frame(self, message: AnyMessage) -> Frame {
        Frame {
            sequence: self.sequence,
            reliable: self.reliable,
            resent: self.resent,
            zero_coded: self.zero_coded,
            extra_header: self.extra_header,
            acks: self.acks,
            message,
        }
    }
}

/// A decoded datagram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// Sequence number for ordering
    pub sequence: u32,
    pub reliable: bool,
    pub resent: bool,
    pub zero_coded: bool,
    pub extra_header: Vec<u8>,
    /// Acks piggy-backed on this datagram
    pub acks: Vec<u32>,
    /// The actual message
    pub message: AnyMessage,
}

/// Outbound packet flags chosen by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reliable: bool,
    pub resent: bool,
}

impl SendOptions {
    pub fn reliable() -> Self {
        Self {
            reliable: true,
            resent: false,
        }
    }
}

/// Encodes messages into the wire format
pub struct Encoder {
    sequence: u32,
    capacity: usize,
    zero_coding: ZeroCoding,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            sequence: 1,
            capacity: MAX_PACKET_SIZE,
            zero_coding: ZeroCoding::Auto,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_zero_coding(mut self, zero_coding: ZeroCoding) -> Self {
        self.zero_coding = zero_coding;
        self
    }

    /// Sequence number the next packet will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    /// Build a transmit-ready packet for `message`, piggy-backing `acks`.
    ///
    /// The sequence number only advances when encoding succeeds.
    pub fn encode(
        &mut self,
        message: &AnyMessage,
        options: SendOptions,
        acks: &[u32],
    ) -> CodecResult<Packet> {
        let mut packet = Packet::with_capacity(self.capacity);
        packet.set_zero_coded(self.zero_coding.applies(message.zero_coded()));
        packet.set_reliable(options.reliable);
        packet.set_resent(options.resent);
        packet.set_sequence(self.sequence);

        message.serialize(&mut packet)?;
        packet.append_acks(acks)?;
        packet.flush()?;

        tracing::trace!(
            sequence = self.sequence,
            message = message.name(),
            len = packet.len(),
            acks = acks.len(),
            "encoded packet"
        );
        self.sequence = self.sequence.wrapping_add(1);
        Ok(packet)
    }

    /// Like [`Encoder::encode`], returning only the bytes to transmit.
    pub fn encode_to_bytes(
        &mut self,
        message: &AnyMessage,
        options: SendOptions,
        acks: &[u32],
    ) -> CodecResult<Bytes> {
        self.encode(message, options, acks).map(|p| p.to_bytes())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes datagrams from the wire format
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'r> {
    registry: &'r Registry,
}

impl Decoder<'static> {
    /// Decoder backed by the standard registry
    pub fn new() -> Self {
        Self::with_registry(Registry::standard())
    }
}

impl<'r> Decoder<'r> {
    pub fn with_registry(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Size check the datagram and take its ack trailer.
    ///
    /// Returns the envelope and the packet positioned at the message
    /// identifier, ready for [`Decoder::decode_message`].
    pub fn open(&self, datagram: &[u8]) -> CodecResult<(Envelope, Packet)> {
        let mut packet = Packet::parse(datagram)?;
        let envelope = Envelope::read(&mut packet)?;
        Ok((envelope, packet))
    }

    /// Read the identifier and dispatch the fields through the registry.
    pub fn decode_message(&self, packet: &mut Packet) -> CodecResult<AnyMessage> {
        let message_type = MessageType::decode(packet)?;
        tracing::trace!(sequence = packet.sequence(), %message_type, "decoding message");
        self.registry.decode(message_type, packet)
    }

    /// Decode one datagram: size check, ack trailer, identifier, fields.
    pub fn decode(&self, datagram: &[u8]) -> CodecResult<Frame> {
        let (envelope, mut packet) = self.open(datagram)?;
        let message = self.decode_message(&mut packet)?;
        Ok(envelope.into_frame(message))
    }
}

impl Default for Decoder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        decode_as, flags, ChatFromViewer, CodecError, CompletePingCheck, DecodeFn, Message,
        StartPingCheck, HEADER_SIZE,
    };
    use uuid::Uuid;

    #[test]
    fn test_scenario_zero_coded_with_acks() {
        // Hand-built: type 7 is not a standard message, so read it back by field.
        let mut packet = Packet::new();
        packet.set_zero_coded(true);
        packet.set_reliable(true);
        packet.set_sequence(42);
        MessageType::high(7).encode(&mut packet).unwrap();
        packet.write_u32(0).unwrap();
        packet.append_acks(&[100, 200]).unwrap();
        packet.flush().unwrap();
        assert_eq!(packet.flags(), flags::ZERO_CODED | flags::RELIABLE | flags::HAS_ACKS);

        let mut inbound = Packet::parse(packet.as_bytes()).unwrap();
        assert_eq!(inbound.sequence(), 42);
        assert!(inbound.is_reliable());
        assert!(!inbound.is_resent());
        assert_eq!(inbound.take_acks().unwrap(), Some(vec![100, 200]));
        assert!(!inbound.has_acks());
        assert_eq!(MessageType::decode(&mut inbound).unwrap(), MessageType::high(7));
        assert_eq!(inbound.read_u32().unwrap(), 0);
        assert_eq!(inbound.take_acks().unwrap(), None);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut encoder = Encoder::new();
        let decoder = Decoder::new();

        let original: AnyMessage = ChatFromViewer {
            agent_id: Uuid::from_u128(1),
            session_id: Uuid::from_u128(2),
            message: "hi".to_string(),
            chat_type: 1,
            channel: 0,
        }
        .into();
        let bytes = encoder
            .encode_to_bytes(&original, SendOptions::reliable(), &[7, 8])
            .unwrap();

        let frame = decoder.decode(&bytes).unwrap();
        assert_eq!(frame.sequence, 1);
        assert!(frame.reliable);
        assert!(frame.zero_coded);
        assert_eq!(frame.acks, vec![7, 8]);
        assert_eq!(frame.message, original);
    }

    #[test]
    fn test_multiple_messages() {
        let mut encoder = Encoder::new().with_zero_coding(ZeroCoding::Never);
        let decoder = Decoder::new();

        let messages: Vec<AnyMessage> = vec![
            StartPingCheck { ping_id: 1, oldest_unacked: 0 }.into(),
            CompletePingCheck { ping_id: 1 }.into(),
        ];

        for (i, message) in messages.iter().enumerate() {
            let bytes = encoder
                .encode_to_bytes(message, SendOptions::default(), &[])
                .unwrap();
            let frame = decoder.decode(&bytes).unwrap();
            assert_eq!(frame.sequence, i as u32 + 1);
            assert!(!frame.zero_coded);
            assert_eq!(&frame.message, message);
        }
        assert_eq!(encoder.next_sequence(), 3);
    }

    #[test]
    fn test_failed_encode_keeps_sequence() {
        let mut encoder = Encoder::new().with_capacity(HEADER_SIZE + 2);
        let message: AnyMessage = StartPingCheck { ping_id: 1, oldest_unacked: 5 }.into();
        assert!(matches!(
            encoder.encode(&message, SendOptions::default(), &[]),
            Err(CodecError::BufferOverrun { .. })
        ));
        assert_eq!(encoder.next_sequence(), 1);
    }

    #[test]
    fn test_unknown_type_is_recoverable() {
        let mut packet = Packet::new();
        MessageType::medium(0x99).encode(&mut packet).unwrap();

        let err = Decoder::new().decode(packet.as_bytes()).unwrap_err();
        assert_eq!(err, CodecError::UnknownMessageType(MessageType::medium(0x99)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_type_keeps_envelope() {
        let mut packet = Packet::new();
        packet.set_reliable(true);
        packet.set_sequence(77);
        MessageType::high(200).encode(&mut packet).unwrap();
        packet.append_acks(&[11, 12]).unwrap();
        packet.flush().unwrap();

        let decoder = Decoder::new();
        let (envelope, mut body) = decoder.open(packet.as_bytes()).unwrap();
        assert_eq!(envelope.sequence, 77);
        assert!(envelope.reliable);
        assert_eq!(envelope.acks, vec![11, 12]);
        assert_eq!(
            decoder.decode_message(&mut body),
            Err(CodecError::UnknownMessageType(MessageType::high(200)))
        );
    }

    #[test]
    fn test_undersized_rejected_before_fields() {
        let err = Decoder::new().decode(&[0x10, 0, 0, 0, 1, 0, 1, 5]).unwrap_err();
        assert_eq!(err, CodecError::UndersizedPacket { available: 8 });
    }

    #[test]
    fn test_custom_registry_decoder() {
        let registry = Registry::from_entries(&[(
            CompletePingCheck::TYPE,
            decode_as::<CompletePingCheck> as DecodeFn,
        )]);
        let decoder = Decoder::with_registry(&registry);

        let mut encoder = Encoder::new();
        let ping: AnyMessage = StartPingCheck { ping_id: 1, oldest_unacked: 0 }.into();
        let bytes = encoder.encode_to_bytes(&ping, SendOptions::default(), &[]).unwrap();
        assert!(matches!(
            decoder.decode(&bytes),
            Err(CodecError::UnknownMessageType(_))
        ));
    }
}
