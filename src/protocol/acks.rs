//! Acknowledgment trailer
//!
//! Acks for earlier packets can ride on the end of any packet:
//!
//! ```text
//! ... body ... | ack0 (u32 BE) | ack1 | ... | count (u8, never zero coded)
//! ```
//!
//! The ack numbers are zero coded along with the body, so the trailer is
//! decoded from the tail toward the head. Taking the trailer removes it from
//! the packet; the has-acks flag is the single record of whether it is still
//! there.

use super::fields::NetworkOrder;
use super::zerocode::{self, TailSpan};
use super::{CodecError, CodecResult, Packet};

/// Most acks a single trailer can carry
pub const MAX_ACKS: usize = u8::MAX as usize;

impl Packet {
    /// Locate the ack trailer without touching the packet.
    ///
    /// Shared by the size check and by [`Packet::take_acks`].
    pub(crate) fn trailer_span(&self) -> CodecResult<Option<TailSpan>> {
        if !self.has_acks() {
            return Ok(None);
        }

        let floor = self.body_offset();
        let len = self.len();
        if len <= floor {
            return Err(CodecError::MalformedAckTrailer {
                count: 0,
                available: 0,
            });
        }

        let count = self.raw()[len - 1] as usize;
        let end = len - 1;
        zerocode::scan_backward(self.raw(), floor, end, count * 4, self.is_zero_coded())
            .map(Some)
            .ok_or(CodecError::MalformedAckTrailer {
                count,
                available: end - floor,
            })
    }

    /// Remove the ack trailer and return its sequence numbers.
    ///
    /// Returns `None` when the packet carries no trailer, including every call
    /// after the first successful one. On success the logical length shrinks
    /// to exclude the trailer and the has-acks flag is cleared.
    pub fn take_acks(&mut self) -> CodecResult<Option<Vec<u32>>> {
        let Some(span) = self.trailer_span()? else {
            return Ok(None);
        };

        let acks = span
            .bytes
            .chunks_exact(4)
            .map(u32::from_network)
            .collect::<Vec<_>>();

        self.truncate(span.start);
        self.set_has_acks(false);
        tracing::trace!(count = acks.len(), "ack trailer taken");
        Ok(Some(acks))
    }

    /// Append an ack trailer. Must be the last thing written to the packet.
    ///
    /// The body's pending zero run is flushed first, and the trailer's own run
    /// is flushed before the raw count byte, so the count is never absorbed
    /// into a run.
    pub fn append_acks(&mut self, acks: &[u32]) -> CodecResult<()> {
        if self.has_acks() {
            return Err(CodecError::TrailerAlreadyPresent);
        }
        if acks.len() > MAX_ACKS {
            return Err(CodecError::TooManyAcks(acks.len()));
        }
        if acks.is_empty() {
            return Ok(());
        }

        self.flush()?;
        for &ack in acks {
            self.write_u32(ack)?;
        }
        self.flush()?;
        self.write_raw_u8(acks.len() as u8)?;
        self.set_has_acks(true);
        Ok(())
    }
}
