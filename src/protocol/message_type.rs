//! Tiered message type identifiers
//!
//! ```text
//! high    0x00000000..=0x000000FE   1 byte   [id]
//! medium  0x0000FF00..=0x0000FFFE   2 bytes  [FF, low]
//! low     0xFFFF0000..=0xFFFFFFFF   4 bytes  [FF, FF, hi, lo]
//! ```

use std::fmt;

use serde::Serialize;

use super::{CodecError, CodecResult, Packet};

/// Size class of an identifier on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Frequency {
    High,
    Medium,
    Low,
}

impl Frequency {
    /// Bytes an identifier of this tier occupies.
    pub fn encoded_len(self) -> usize {
        match self {
            Frequency::High => 1,
            Frequency::Medium => 2,
            Frequency::Low => 4,
        }
    }
}

/// Transmission priority, used for scheduling by the circuit layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A 32-bit message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageType(u32);

impl MessageType {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// A high frequency identifier (`0..=0xFE`).
    pub const fn high(id: u8) -> Self {
        Self(id as u32)
    }

    /// A medium frequency identifier (`0xFF00 | id`).
    pub const fn medium(id: u8) -> Self {
        Self(0xFF00 | id as u32)
    }

    /// A low frequency identifier (`0xFFFF0000 | id`).
    pub const fn low(id: u16) -> Self {
        Self(0xFFFF_0000 | id as u32)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// The tier this identifier encodes into, if any.
    pub fn frequency(self) -> Option<Frequency> {
        match self.0 {
            0..=0xFE => Some(Frequency::High),
            0xFF00..=0xFFFE => Some(Frequency::Medium),
            0xFFFF_0000..=0xFFFF_FFFF => Some(Frequency::Low),
            _ => None,
        }
    }

    /// Scheduling priority derived purely from the numeric range.
    pub fn priority(self) -> Priority {
        match self.0 {
            0..=0xFE => Priority::High,
            0xFF..=0xFFFE => Priority::Medium,
            _ => Priority::Low,
        }
    }

    /// Write the identifier into the body of `packet`.
    pub fn encode(self, packet: &mut Packet) -> CodecResult<()> {
        let bytes = self.to_wire()?;
        let len = self.frequency().map_or(0, Frequency::encoded_len);
        packet.write_bytes(&bytes[..len])
    }

    /// Read an identifier from the body of `packet`.
    pub fn decode(packet: &mut Packet) -> CodecResult<Self> {
        let high = packet.read_u8()?;
        if high != 0xFF {
            return Ok(Self(high as u32));
        }

        let medium = packet.read_u8()?;
        if medium != 0xFF {
            return Ok(Self(0xFF00 | medium as u32));
        }

        let mut low = [0u8; 2];
        packet.read_bytes(&mut low)?;
        Ok(Self(0xFFFF_0000 | u16::from_be_bytes(low) as u32))
    }

    fn to_wire(self) -> CodecResult<[u8; 4]> {
        match self.frequency() {
            Some(Frequency::High) => Ok([self.0 as u8, 0, 0, 0]),
            Some(Frequency::Medium) => Ok([0xFF, self.0 as u8, 0, 0]),
            Some(Frequency::Low) => {
                let [hi, lo] = (self.0 as u16).to_be_bytes();
                Ok([0xFF, 0xFF, hi, lo])
            }
            None => Err(CodecError::InvalidMessageType(self.0)),
        }
    }
}

impl From<u32> for MessageType {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.frequency() {
            Some(Frequency::High) => write!(f, "High {}", self.0),
            Some(Frequency::Medium) => write!(f, "Medium {}", self.0 & 0xFF),
            Some(Frequency::Low) => write!(f, "Low {}", self.0 & 0xFFFF),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u32) -> Vec<u8> {
        let mut packet = Packet::new();
        MessageType::new(value).encode(&mut packet).unwrap();
        packet.body().to_vec()
    }

    #[test]
    fn test_tier_boundaries_roundtrip() {
        let cases = [
            (0x0000_0000, 1),
            (0x0000_00FE, 1),
            (0x0000_FF00, 2),
            (0x0000_FFFE, 2),
            (0xFFFF_0000, 4),
            (0xFFFF_FFFF, 4),
        ];

        for (value, len) in cases {
            let mut packet = Packet::new();
            MessageType::new(value).encode(&mut packet).unwrap();
            assert_eq!(packet.body().len(), len, "width of {value:#x}");

            packet.reset();
            assert_eq!(MessageType::decode(&mut packet).unwrap().value(), value);
        }
    }

    #[test]
    fn test_medium_exact_bytes() {
        assert_eq!(encoded(0x0000_FF10), vec![0xFF, 0x10]);
        assert_eq!(encoded(0xFFFF_0102), vec![0xFF, 0xFF, 0x01, 0x02]);
    }

    #[test]
    fn test_gaps_are_not_representable() {
        for value in [0xFF, 0x1234, 0xFFFF, 0x0001_0000, 0xFFFE_FFFF] {
            let mut packet = Packet::new();
            assert_eq!(
                MessageType::new(value).encode(&mut packet),
                Err(CodecError::InvalidMessageType(value))
            );
            assert!(packet.body().is_empty());
        }
    }

    #[test]
    fn test_priority_ranges() {
        assert_eq!(MessageType::high(4).priority(), Priority::High);
        assert_eq!(MessageType::medium(6).priority(), Priority::Medium);
        assert_eq!(MessageType::low(3).priority(), Priority::Low);
    }

    #[test]
    fn test_display() {
        assert_eq!(MessageType::medium(6).to_string(), "Medium 6");
        assert_eq!(MessageType::low(0xFFFB).to_string(), "Low 65531");
    }
}
