//! Zero run-length transform
//!
//! Runs of zero bytes are collapsed into a `(0x00, count)` pair. The count is
//! a single byte, so runs longer than 255 are split into several pairs.
//!
//! ```text
//! 07 00 00 00 00 64      ->  07 00 04 64
//! 300 x 00               ->  00 FF 00 2D
//! ```
//!
//! The encoder and decoder are incremental because a run may span several
//! fields of the same packet; the packet owns one of each and carries the
//! pending run (or the not-yet-emitted zeros) from one field to the next.

use super::{CodecError, CodecResult};

/// Byte that introduces a zero run.
pub const ZERO_MARKER: u8 = 0x00;

/// Longest run a single marker pair can describe.
pub const MAX_RUN: u8 = u8::MAX;

/// Incremental zero run encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunEncoder {
    pending: u8,
}

impl RunEncoder {
    pub fn new() -> Self {
        Self { pending: 0 }
    }

    /// Number of zeros held back, waiting for a terminating byte or a flush.
    pub fn pending(&self) -> u8 {
        self.pending
    }

    pub fn reset(&mut self) {
        self.pending = 0;
    }

    fn step(&mut self, byte: u8, emit: &mut impl FnMut(u8)) {
        if byte == 0 {
            if self.pending == MAX_RUN {
                emit(ZERO_MARKER);
                emit(MAX_RUN);
                self.pending = 1;
            } else {
                self.pending += 1;
            }
        } else {
            if self.pending != 0 {
                emit(ZERO_MARKER);
                emit(self.pending);
                self.pending = 0;
            }
            emit(byte);
        }
    }

    /// Physical bytes that encoding `bytes` would emit from the current state.
    fn measure(&self, bytes: &[u8]) -> usize {
        let mut sim = *self;
        let mut count = 0;
        for &b in bytes {
            sim.step(b, &mut |_| count += 1);
        }
        count
    }

    /// Encode `bytes` into `out` starting at `*pos`.
    ///
    /// Nothing is written, and the state is left untouched, when the encoded
    /// form would not fit below `out.len()`.
    pub fn encode(&mut self, bytes: &[u8], out: &mut [u8], pos: &mut usize) -> CodecResult<()> {
        let needed = self.measure(bytes);
        check_room(*pos, needed, out.len())?;

        let mut cursor = *pos;
        for &b in bytes {
            self.step(b, &mut |e| {
                out[cursor] = e;
                cursor += 1;
            });
        }
        *pos = cursor;
        Ok(())
    }

    /// Terminate the pending run, if any.
    pub fn finish(&mut self, out: &mut [u8], pos: &mut usize) -> CodecResult<()> {
        if self.pending == 0 {
            return Ok(());
        }
        check_room(*pos, 2, out.len())?;
        out[*pos] = ZERO_MARKER;
        out[*pos + 1] = self.pending;
        *pos += 2;
        self.pending = 0;
        Ok(())
    }
}

/// Incremental zero run decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunDecoder {
    carry: u8,
}

impl RunDecoder {
    pub fn new() -> Self {
        Self { carry: 0 }
    }

    /// Zeros already accounted for by a consumed marker but not yet handed out.
    pub fn carry(&self) -> u8 {
        self.carry
    }

    pub fn reset(&mut self) {
        self.carry = 0;
    }

    /// Fill `out` with logical bytes read from `src[*pos..limit]`.
    ///
    /// On error neither `*pos` nor the carry-over change.
    pub fn decode(
        &mut self,
        src: &[u8],
        pos: &mut usize,
        limit: usize,
        out: &mut [u8],
    ) -> CodecResult<()> {
        let limit = limit.min(src.len());
        let mut cursor = *pos;
        let mut carry = self.carry;

        for slot in out.iter_mut() {
            if carry > 0 {
                *slot = 0;
                carry -= 1;
                continue;
            }
            check_room(cursor, 1, limit)?;
            let byte = src[cursor];
            if byte == ZERO_MARKER {
                if cursor + 1 >= limit || src[cursor + 1] == 0 {
                    return Err(CodecError::MalformedZeroRun { offset: cursor });
                }
                *slot = 0;
                carry = src[cursor + 1] - 1;
                cursor += 2;
            } else {
                *slot = byte;
                cursor += 1;
            }
        }

        *pos = cursor;
        self.carry = carry;
        Ok(())
    }
}

/// Zero-encode a complete byte sequence.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = RunEncoder::new();
    let mut out = vec![0u8; encoder.measure(data) + 2];
    let mut pos = 0;
    // The buffer is sized from `measure`, so neither call can overrun.
    let _ = encoder.encode(data, &mut out, &mut pos);
    let _ = encoder.finish(&mut out, &mut pos);
    out.truncate(pos);
    out
}

/// Decode `len` logical bytes from the start of `encoded`.
pub fn decode(encoded: &[u8], len: usize) -> CodecResult<Vec<u8>> {
    let mut out = vec![0u8; len];
    let mut pos = 0;
    RunDecoder::new().decode(encoded, &mut pos, encoded.len(), &mut out)?;
    Ok(out)
}

/// A span of logical bytes reconstructed from the tail of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailSpan {
    /// Physical offset where the span starts.
    pub start: usize,
    /// Logical bytes, head to tail.
    pub bytes: Vec<u8>,
}

/// Reconstruct `logical` bytes that end just before `end`, scanning toward
/// the head of `buf` but never below `floor`.
///
/// When `zero_coded` is set, each step looks at the two bytes preceding the
/// cursor: a `(0x00, count)` pair yields `count` zeros, anything else yields
/// the single preceding byte. Returns `None` when the span would cross
/// `floor`, when a run overshoots the requested length, or when a zero byte
/// appears without its count.
pub fn scan_backward(
    buf: &[u8],
    floor: usize,
    end: usize,
    logical: usize,
    zero_coded: bool,
) -> Option<TailSpan> {
    if end > buf.len() || end < floor {
        return None;
    }

    if !zero_coded {
        let start = end.checked_sub(logical).filter(|&s| s >= floor)?;
        return Some(TailSpan {
            start,
            bytes: buf[start..end].to_vec(),
        });
    }

    let mut reversed = Vec::with_capacity(logical);
    let mut cursor = end;
    while reversed.len() < logical {
        if cursor <= floor {
            return None;
        }
        if cursor >= floor + 2 && buf[cursor - 2] == ZERO_MARKER {
            let count = buf[cursor - 1] as usize;
            if count == 0 || reversed.len() + count > logical {
                return None;
            }
            reversed.resize(reversed.len() + count, 0);
            cursor -= 2;
        } else {
            let byte = buf[cursor - 1];
            if byte == ZERO_MARKER {
                return None;
            }
            reversed.push(byte);
            cursor -= 1;
        }
    }

    reversed.reverse();
    Some(TailSpan {
        start: cursor,
        bytes: reversed,
    })
}

fn check_room(offset: usize, needed: usize, limit: usize) -> CodecResult<()> {
    if offset + needed > limit {
        return Err(CodecError::BufferOverrun {
            offset,
            needed,
            limit,
        });
    }
    Ok(())
}
