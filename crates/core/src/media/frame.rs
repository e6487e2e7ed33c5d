//! Positioned-frame payload codec.
//!
//! RTP payloads carry a small framing record so that each frame lands at
//! the right byte offset of the receiver's output file no matter how UDP
//! reorders or drops datagrams:
//!
//! ```text
//! +-----------+----------------+----------+--------------+------------+
//! | posLen: 1 | pos: posLen    | sizeLen:1| size: sizeLen| frame bytes|
//! +-----------+----------------+----------+--------------+------------+
//! ```
//!
//! Both integers are little-endian with the minimal number of bytes
//! (no high-order zero bytes; the value 0 still occupies one byte).

use bytes::BufMut;

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::media::Frame;

/// Append `value` as a length-prefixed minimal little-endian integer.
fn put_uint_minimal(buf: &mut Vec<u8>, mut value: u64) {
    let start = buf.len();
    buf.put_u8(0); // length placeholder
    loop {
        buf.put_u8((value & 0xFF) as u8);
        value >>= 8;
        if value == 0 {
            break;
        }
    }
    buf[start] = (buf.len() - start - 1) as u8;
}

fn get_uint_minimal(buf: &[u8], at: usize) -> Result<(u64, usize)> {
    let truncated = || RtspError::Parse {
        kind: ParseErrorKind::TruncatedFrame,
    };

    let len = *buf.get(at).ok_or_else(truncated)? as usize;
    if len == 0 || len > 8 {
        return Err(truncated());
    }
    let bytes = buf.get(at + 1..at + 1 + len).ok_or_else(truncated)?;
    let mut value = 0u64;
    for (i, b) in bytes.iter().enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    Ok((value, at + 1 + len))
}

/// Encode one frame into the payload record.
pub fn encode(position: u64, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 20);
    put_uint_minimal(&mut buf, position);
    put_uint_minimal(&mut buf, data.len() as u64);
    buf.put_slice(data);
    buf
}

/// Decode a payload record back into a [`Frame`].
///
/// The declared size must be fully present; trailing bytes beyond it are
/// ignored (a sender never produces them, but a corrupt datagram might).
pub fn decode(payload: &[u8]) -> Result<Frame> {
    let truncated = || RtspError::Parse {
        kind: ParseErrorKind::TruncatedFrame,
    };

    let (position, next) = get_uint_minimal(payload, 0)?;
    let (size, next) = get_uint_minimal(payload, next)?;
    let end = usize::try_from(size)
        .ok()
        .and_then(|size| next.checked_add(size))
        .ok_or_else(truncated)?;
    let data = payload.get(next..end).ok_or_else(truncated)?;
    Ok(Frame {
        position,
        data: data.to_vec(),
    })
}
