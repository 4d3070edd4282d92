//! Codec errors
//!
//! Every failure the codec can detect is reported synchronously as a
//! `CodecError`. None of them are fatal to a receive loop: a malformed datagram
//! from a peer is dropped and the next one is processed.

use thiserror::Error;

use super::MessageType;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Undersized packet: declared structure does not fit in {available} bytes")]
    UndersizedPacket { available: usize },

    #[error("Buffer overrun: {needed} bytes at offset {offset} exceeds limit {limit}")]
    BufferOverrun {
        offset: usize,
        needed: usize,
        limit: usize,
    },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(MessageType),

    #[error("Invalid message type: {0:#010x} fits no frequency tier")]
    InvalidMessageType(u32),

    #[error("Malformed ack trailer: {count} acks declared, {available} bytes available")]
    MalformedAckTrailer { count: usize, available: usize },

    #[error("Malformed zero run at offset {offset}")]
    MalformedZeroRun { offset: usize },

    #[error("Too many acks for one trailer: {0} (max 255)")]
    TooManyAcks(usize),

    #[error("Too many blocks for a u8 count: {0}")]
    TooManyBlocks(usize),

    #[error("Ack trailer already present")]
    TrailerAlreadyPresent,

    #[error("Text field is not valid UTF-8")]
    InvalidUtf8,

    #[error("Text field too long: {len} bytes (max: {max})")]
    StringTooLong { len: usize, max: usize },
}

impl CodecError {
    /// Whether this error can be caused by untrusted input.
    ///
    /// Recoverable errors are routine network noise: log, drop the datagram
    /// and keep going. The rest indicate a bug on the sending side of this
    /// process.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CodecError::InvalidMessageType(_)
                | CodecError::TooManyAcks(_)
                | CodecError::TooManyBlocks(_)
                | CodecError::TrailerAlreadyPresent
                | CodecError::StringTooLong { .. }
        )
    }
}

pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(CodecError::UnknownMessageType(MessageType::new(9)).is_recoverable());
        assert!(CodecError::MalformedZeroRun { offset: 3 }.is_recoverable());
        assert!(!CodecError::InvalidMessageType(0x1234).is_recoverable());
        assert!(!CodecError::TooManyAcks(300).is_recoverable());
    }

    #[test]
    fn test_display_mentions_type() {
        let err = CodecError::InvalidMessageType(0x0001_0000);
        assert_eq!(
            err.to_string(),
            "Invalid message type: 0x00010000 fits no frequency tier"
        );
    }
}
