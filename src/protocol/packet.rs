//! Packet frame
//!
//! A packet is a bounded byte buffer with a fixed 6 byte header:
//!
//! ```text
//! 0      flags   [zero-coded:1][reliable:1][resent:1][has-acks:1][reserved:4]
//! 1..5   sequence number (big-endian)
//! 5      extra header length
//! 6..    extra header, then body, then the optional ack trailer
//! ```
//!
//! Cursors and the length are physical offsets into the buffer. When the
//! zero-coded flag is set, body bytes pass through the zero run transform on
//! the way in and out.

use std::fmt;

use bytes::Bytes;

use super::fields::NetworkOrder;
use super::zerocode::{RunDecoder, RunEncoder, MAX_RUN};
use super::{CodecError, CodecResult};

/// Size of the fixed packet header
pub const HEADER_SIZE: usize = 6;

/// Default physical capacity of an outbound packet
pub const MAX_PACKET_SIZE: usize = 4096;

/// Longest extra header the length byte can describe
pub const MAX_EXTRA_HEADER: usize = u8::MAX as usize;

const SEQUENCE_OFFSET: usize = 1;
const EXTRA_LEN_OFFSET: usize = 5;

/// Header flag bits (byte 0)
pub mod flags {
    /// Body is zero run-length encoded.
    pub const ZERO_CODED: u8 = 0b1000_0000;
    /// Sender expects an acknowledgment.
    pub const RELIABLE: u8 = 0b0100_0000;
    /// Retransmission of an earlier packet.
    pub const RESENT: u8 = 0b0010_0000;
    /// Ack trailer appended at the end.
    pub const HAS_ACKS: u8 = 0b0001_0000;

    /// Reserved bits, preserved but never interpreted.
    pub const RESERVED_MASK: u8 = 0b0000_1111;
}

/// A single datagram, inbound or outbound
#[derive(Clone)]
pub struct Packet {
    buf: Box<[u8]>,
    len: usize,
    write_pos: usize,
    read_pos: usize,
    encoder: RunEncoder,
    decoder: RunDecoder,
}

impl Packet {
    /// Create an empty outbound packet with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_PACKET_SIZE)
    }

    /// Create an empty outbound packet. Capacity never drops below the header.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(HEADER_SIZE)].into_boxed_slice(),
            len: HEADER_SIZE,
            write_pos: HEADER_SIZE,
            read_pos: HEADER_SIZE,
            encoder: RunEncoder::new(),
            decoder: RunDecoder::new(),
        }
    }

    /// Wrap a received datagram.
    ///
    /// Only the fixed header is validated here; call [`Packet::is_undersized`]
    /// (or use [`Packet::parse`]) before reading any field.
    pub fn from_datagram(data: &[u8]) -> CodecResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::UndersizedPacket {
                available: data.len(),
            });
        }

        let mut packet = Self {
            buf: data.to_vec().into_boxed_slice(),
            len: data.len(),
            write_pos: HEADER_SIZE,
            read_pos: HEADER_SIZE,
            encoder: RunEncoder::new(),
            decoder: RunDecoder::new(),
        };
        packet.reset();
        Ok(packet)
    }

    /// Wrap a received datagram and reject it if its declared structure does
    /// not fit.
    pub fn parse(data: &[u8]) -> CodecResult<Self> {
        let packet = Self::from_datagram(data)?;
        packet.check_size()?;
        Ok(packet)
    }

    /// Physical buffer size
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Logical length: the prefix of the buffer that carries data
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.len <= self.body_offset()
    }

    pub fn flags(&self) -> u8 {
        self.buf[0]
    }

    fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.buf[0] |= mask;
        } else {
            self.buf[0] &= !mask;
        }
    }

    pub fn is_zero_coded(&self) -> bool {
        self.flags() & flags::ZERO_CODED != 0
    }

    pub fn set_zero_coded(&mut self, on: bool) {
        self.set_flag(flags::ZERO_CODED, on);
    }

    pub fn is_reliable(&self) -> bool {
        self.flags() & flags::RELIABLE != 0
    }

    pub fn set_reliable(&mut self, on: bool) {
        self.set_flag(flags::RELIABLE, on);
    }

    pub fn is_resent(&self) -> bool {
        self.flags() & flags::RESENT != 0
    }

    pub fn set_resent(&mut self, on: bool) {
        self.set_flag(flags::RESENT, on);
    }

    pub fn has_acks(&self) -> bool {
        self.flags() & flags::HAS_ACKS != 0
    }

    pub(crate) fn set_has_acks(&mut self, on: bool) {
        self.set_flag(flags::HAS_ACKS, on);
    }

    pub fn sequence(&self) -> u32 {
        u32::from_network(&self.buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4])
    }

    pub fn set_sequence(&mut self, sequence: u32) {
        sequence.to_network(&mut self.buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4]);
    }

    /// Offset of the first body byte, just past the extra header
    pub fn body_offset(&self) -> usize {
        HEADER_SIZE + self.buf[EXTRA_LEN_OFFSET] as usize
    }

    pub fn extra_header(&self) -> &[u8] {
        let end = self.body_offset().min(self.len);
        &self.buf[HEADER_SIZE..end]
    }

    /// Replace the extra header block. The body is discarded.
    pub fn set_extra_header(&mut self, extra: &[u8]) -> CodecResult<()> {
        let end = HEADER_SIZE + extra.len();
        if extra.len() > MAX_EXTRA_HEADER || end > self.capacity() {
            return Err(CodecError::BufferOverrun {
                offset: HEADER_SIZE,
                needed: extra.len(),
                limit: self.capacity().min(HEADER_SIZE + MAX_EXTRA_HEADER),
            });
        }

        self.buf[EXTRA_LEN_OFFSET] = extra.len() as u8;
        self.buf[HEADER_SIZE..end].copy_from_slice(extra);
        self.clear();
        Ok(())
    }

    /// Body bytes as stored, possibly zero coded
    pub fn body(&self) -> &[u8] {
        let start = self.body_offset().min(self.len);
        &self.buf[start..self.len]
    }

    /// The bytes to transmit
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    /// Rewind both cursors to the start of the body. The length is kept.
    pub fn reset(&mut self) {
        let start = self.body_offset().min(self.len);
        self.read_pos = start;
        self.write_pos = start;
        self.encoder.reset();
        self.decoder.reset();
    }

    /// Rewind and drop the body.
    pub fn clear(&mut self) {
        self.len = self.body_offset().min(self.capacity());
        self.reset();
    }

    /// Terminate any pending zero run and make the length cover everything
    /// written. Must be called before a zero-coded packet is transmitted.
    pub fn flush(&mut self) -> CodecResult<()> {
        self.encoder.finish(&mut self.buf, &mut self.write_pos)?;
        self.len = self.write_pos;
        Ok(())
    }

    /// True when the extra header or the ack trailer declared in the header
    /// would reach past the received bytes. Never modifies the packet.
    pub fn is_undersized(&self) -> bool {
        self.check_size().is_err()
    }

    /// Like [`Packet::is_undersized`], but reports the failure.
    pub fn check_size(&self) -> CodecResult<()> {
        let undersized = CodecError::UndersizedPacket {
            available: self.len,
        };
        if self.len < HEADER_SIZE || self.body_offset() > self.len {
            return Err(undersized);
        }
        self.trailer_span().map_err(|_| undersized)?;
        Ok(())
    }

    /// Bytes left to read before the logical end
    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.read_pos)
    }

    /// Upper bound on the logical bytes the rest of the body can yield.
    ///
    /// Each marker pair expands to at most [`MAX_RUN`] zeros.
    pub fn readable_bound(&self) -> usize {
        let remaining = self.remaining();
        if !self.is_zero_coded() {
            return remaining;
        }
        (remaining / 2) * MAX_RUN as usize + remaining % 2 + self.decoder.carry() as usize
    }

    /// Write body bytes, zero coding them when the packet is zero coded.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        if self.has_acks() {
            return Err(CodecError::TrailerAlreadyPresent);
        }

        if self.is_zero_coded() {
            self.encoder
                .encode(bytes, &mut self.buf, &mut self.write_pos)?;
        } else {
            let end = self.reserve(bytes.len())?;
            self.buf[self.write_pos..end].copy_from_slice(bytes);
            self.write_pos = end;
        }
        self.len = self.write_pos;
        Ok(())
    }

    /// Write one byte, bypassing the zero run transform.
    pub(crate) fn write_raw_u8(&mut self, byte: u8) -> CodecResult<()> {
        let end = self.reserve(1)?;
        self.buf[self.write_pos] = byte;
        self.write_pos = end;
        self.len = end;
        Ok(())
    }

    /// Fill `out` from the body, undoing the zero run transform when the
    /// packet is zero coded. Reads stop at the logical length.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> CodecResult<()> {
        if self.is_zero_coded() {
            return self
                .decoder
                .decode(&self.buf, &mut self.read_pos, self.len, out);
        }

        let end = self.read_pos + out.len();
        if end > self.len {
            return Err(CodecError::BufferOverrun {
                offset: self.read_pos,
                needed: out.len(),
                limit: self.len,
            });
        }
        out.copy_from_slice(&self.buf[self.read_pos..end]);
        self.read_pos = end;
        Ok(())
    }

    /// Raw buffer access for the trailer codec.
    pub(crate) fn raw(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.len = len.min(self.len);
        self.read_pos = self.read_pos.min(self.len);
        self.write_pos = self.write_pos.min(self.len);
    }

    fn reserve(&self, needed: usize) -> CodecResult<usize> {
        let end = self.write_pos + needed;
        if end > self.capacity() {
            return Err(CodecError::BufferOverrun {
                offset: self.write_pos,
                needed,
                limit: self.capacity(),
            });
        }
        Ok(end)
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("flags", &format_args!("{:#04x}", self.flags()))
            .field("sequence", &self.sequence())
            .field("extra_header", &self.extra_header().len())
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut packet = Packet::new();
        packet.set_zero_coded(true);
        packet.set_reliable(true);
        packet.set_sequence(0x0102_0304);

        assert_eq!(packet.as_bytes(), &[0xC0, 0x01, 0x02, 0x03, 0x04, 0x00]);
        assert_eq!(packet.sequence(), 0x0102_0304);
    }

    #[test]
    fn test_flags_preserve_other_bits() {
        let mut packet = Packet::from_datagram(&[0x0F, 0, 0, 0, 0, 0]).unwrap();
        packet.set_resent(true);
        packet.set_reliable(true);
        packet.set_reliable(false);
        assert_eq!(packet.flags(), 0x2F);
        assert!(packet.is_resent());
        assert!(!packet.is_reliable());
        assert!(!packet.has_acks());
    }

    #[test]
    fn test_extra_header() {
        let mut packet = Packet::new();
        packet.set_extra_header(&[9, 8, 7]).unwrap();
        packet.write_bytes(&[1]).unwrap();

        assert_eq!(packet.body_offset(), 9);
        assert_eq!(packet.as_bytes(), &[0, 0, 0, 0, 0, 3, 9, 8, 7, 1]);

        let parsed = Packet::parse(packet.as_bytes()).unwrap();
        assert_eq!(parsed.extra_header(), &[9, 8, 7]);
        assert_eq!(parsed.body(), &[1]);
    }

    #[test]
    fn test_extra_header_too_large() {
        let mut packet = Packet::with_capacity(8);
        assert!(matches!(
            packet.set_extra_header(&[1, 2, 3]),
            Err(CodecError::BufferOverrun { .. })
        ));
    }

    #[test]
    fn test_write_overrun_is_reported() {
        let mut packet = Packet::with_capacity(HEADER_SIZE + 2);
        packet.write_bytes(&[1, 2]).unwrap();
        assert_eq!(
            packet.write_bytes(&[3]),
            Err(CodecError::BufferOverrun {
                offset: 8,
                needed: 1,
                limit: 8,
            })
        );
        assert_eq!(packet.body(), &[1, 2]);
    }

    #[test]
    fn test_read_stops_at_logical_length() {
        let mut packet = Packet::from_datagram(&[0, 0, 0, 0, 1, 0, 0xAB]).unwrap();
        let mut one = [0u8; 1];
        packet.read_bytes(&mut one).unwrap();
        assert_eq!(one, [0xAB]);
        assert!(matches!(
            packet.read_bytes(&mut one),
            Err(CodecError::BufferOverrun { .. })
        ));
    }

    #[test]
    fn test_flush_terminates_zero_run() {
        let mut packet = Packet::new();
        packet.set_zero_coded(true);
        packet.write_bytes(&[5, 0, 0, 0]).unwrap();
        assert_eq!(packet.body(), &[5]);

        packet.flush().unwrap();
        assert_eq!(packet.body(), &[5, 0x00, 3]);
    }

    #[test]
    fn test_reset_and_clear() {
        let mut packet = Packet::new();
        packet.write_bytes(&[1, 2, 3]).unwrap();

        packet.reset();
        assert_eq!(packet.len(), HEADER_SIZE + 3);
        let mut out = [0u8; 3];
        packet.read_bytes(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);

        packet.clear();
        assert_eq!(packet.len(), HEADER_SIZE);
        assert!(packet.is_empty());
    }

    #[test]
    fn test_short_datagram_rejected() {
        assert_eq!(
            Packet::from_datagram(&[0, 0, 0]).unwrap_err(),
            CodecError::UndersizedPacket { available: 3 }
        );
    }

    #[test]
    fn test_extra_header_past_end_is_undersized() {
        let data = [0, 0, 0, 0, 1, 10, 1, 2];
        let packet = Packet::from_datagram(&data).unwrap();
        assert!(packet.is_undersized());
        assert_eq!(
            Packet::parse(&data).unwrap_err(),
            CodecError::UndersizedPacket { available: 8 }
        );
    }
}
