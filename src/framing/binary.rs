//! Binary framing for the adapter↔debuggee leg (spec §4.1, §6):
//! `"DP" | version:u8 | kind:u8 | length:BE32 | payload`.
//!
//! There is no precedent for this exact framing in the teacher (which
//! only ever spoke `Content-Length` text framing to IDEs), so this is
//! built directly from spec §4.1/§6's byte layout, following the same
//! "read header, validate, read exactly N payload bytes" shape as
//! [`crate::framing::text`] and the teacher's transports for symmetry.

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;

use crate::error::FramingError;

const MAGIC: [u8; 2] = *b"DP";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 8;

/// `kind` byte distinguishing the two directions of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFrameKind {
    /// An event or response originating at the debuggee.
    FromDebuggee = 1,
    /// A command sent to the debuggee.
    ToDebuggee = 2,
}

impl BinaryFrameKind {
    fn from_byte(b: u8) -> Result<Self, FramingError> {
        match b {
            1 => Ok(BinaryFrameKind::FromDebuggee),
            2 => Ok(BinaryFrameKind::ToDebuggee),
            other => Err(FramingError::UnknownKind(other)),
        }
    }
}

/// Reads one binary frame, returning `(kind, payload)`. `Ok(None)` on a
/// clean EOF before any header byte arrives.
pub fn read_binary_frame(reader: &mut (impl Read + ?Sized)) -> Result<Option<(BinaryFrameKind, Value)>, FramingError> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FramingError::ShortRead);
        }
        filled += n;
    }

    if header[0..2] != MAGIC {
        return Err(FramingError::BadMagic);
    }
    if header[2] != VERSION {
        return Err(FramingError::UnsupportedVersion(header[2]));
    }
    let kind = BinaryFrameKind::from_byte(header[3])?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let value: Value = serde_json::from_slice(&payload)?;
    Ok(Some((kind, value)))
}

/// Writes one binary frame atomically.
pub fn write_binary_frame(
    writer: &mut (impl Write + ?Sized),
    kind: BinaryFrameKind,
    message: &impl Serialize,
) -> Result<(), FramingError> {
    let payload = serde_json::to_vec(message)?;
    let mut framed = BytesMut::with_capacity(HEADER_LEN + payload.len());
    framed.put_slice(&MAGIC);
    framed.put_u8(VERSION);
    framed.put_u8(kind as u8);
    framed.put_u32(payload.len() as u32);
    framed.put_slice(&payload);
    writer.write_all(&framed)?;
    writer.flush()?;
    Ok(())
}

/// Parses a raw 8-byte header + payload pair produced by
/// [`write_binary_frame`], for round-trip property tests
/// (spec §8 testable property #9).
#[cfg(test)]
pub(crate) fn unpack(bytes: &[u8]) -> Result<(BinaryFrameKind, Vec<u8>), FramingError> {
    use bytes::Buf;
    let mut cursor = bytes;
    if cursor.len() < HEADER_LEN {
        return Err(FramingError::ShortRead);
    }
    if cursor[0..2] != MAGIC {
        return Err(FramingError::BadMagic);
    }
    let version = cursor[2];
    if version != VERSION {
        return Err(FramingError::UnsupportedVersion(version));
    }
    let kind = BinaryFrameKind::from_byte(cursor[3])?;
    cursor.advance(4);
    let len = cursor.get_u32() as usize;
    if cursor.len() < len {
        return Err(FramingError::ShortRead);
    }
    Ok((kind, cursor[..len].to_vec()))
}
