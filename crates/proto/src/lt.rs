//! Length-type framing.
//!
//! ```text
//! +----------------+----------------+-----------------+
//! | len: u32 (BE)  | type: u32 (BE) | body            |
//! +----------------+----------------+-----------------+
//! ```
//!
//! `len` covers the whole frame, header included.

use crate::error::{ProtoError, Result};

pub const HEADER_LEN: usize = 8;

/// Largest frame accepted from a peer: one jumbo-ish Ethernet frame plus the
/// biggest fixed-size message header.
pub const MAX_FRAME_LEN: u32 = 65_536 + HEADER_LEN as u32;

/// A decoded frame borrowing its body from the input buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub ty: u32,
    pub body: &'a [u8],
    pub consumed: usize,
}

/// Encode `body` as a frame of type `ty`.
pub fn encode_frame(ty: u32, body: &[u8]) -> Vec<u8> {
    let len = (HEADER_LEN + body.len()) as u32;
    let mut out = Vec::with_capacity(len as usize);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&ty.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Validate a frame header and return `(len, type)`.
pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<(u32, u32)> {
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let ty = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if (len as usize) < HEADER_LEN {
        return Err(ProtoError::FrameTooShort(len));
    }
    if len > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLong {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok((len, ty))
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` while the buffer does not yet hold a complete frame.
pub fn decode_frame(buf: &[u8]) -> Result<Option<Frame<'_>>> {
    let Some(header) = buf.first_chunk::<HEADER_LEN>() else {
        return Ok(None);
    };
    let (len, ty) = parse_header(header)?;
    let len = len as usize;
    if buf.len() < len {
        return Ok(None);
    }
    Ok(Some(Frame {
        ty,
        body: &buf[HEADER_LEN..len],
        consumed: len,
    }))
}
