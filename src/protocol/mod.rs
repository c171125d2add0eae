//! Wire Protocol
//!
//! Primitive encoders and decoders for the clipboard transfer wire format.
//!
//! # Overview
//!
//! A payload travels as a flat sequence of items terminated by a sentinel:
//!
//! ```text
//! Payload        := Item* Sentinel
//! Item           := RepCount(u8, 1-255) Representation{RepCount}
//! Representation := TypeTagLen(u64 BE) TypeTagUTF8Bytes DataLen(u64 BE) DataBytes
//! Sentinel       := RepCount(u8) == 0
//! ```
//!
//! There is no version header, no magic and no payload-level length. The
//! receiver knows the payload is complete when it reads a representation count
//! of zero.
//!
//! All decoders are non-consuming previews over an immutable slice: they return
//! the decoded value together with the number of bytes it occupies, and the
//! caller decides when to evict those bytes from its [`ByteQueue`]. The codec
//! itself holds no state.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

mod buffer;

pub use buffer::ByteQueue;

/// Size of the representation count field
pub const REP_COUNT_SIZE: usize = 1;

/// Size of every length prefix (type tag and data)
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Representation count that terminates a payload
pub const SENTINEL: u8 = 0;

/// Largest number of representations one item can carry on the wire
pub const MAX_REPRESENTATIONS: usize = u8::MAX as usize;

/// Wire decoding errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes are buffered than the field needs.
    ///
    /// This is the normal "wait for more data" signal, not a fault.
    #[error("Truncated field: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to decode the field
        needed: usize,
        /// Bytes currently available
        available: usize,
    },

    /// String field is not valid UTF-8
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,
}

/// Result type for wire decoding
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Append a single count byte
pub fn encode_u8(buf: &mut BytesMut, n: u8) {
    buf.put_u8(n);
}

/// Append a big-endian u64
pub fn encode_u64_be(buf: &mut BytesMut, n: u64) {
    buf.put_u64(n);
}

/// Append a length-prefixed UTF-8 string
pub fn encode_str(buf: &mut BytesMut, s: &str) {
    encode_blob(buf, s.as_bytes());
}

/// Append a length-prefixed opaque blob
pub fn encode_blob(buf: &mut BytesMut, data: &[u8]) {
    buf.reserve(LENGTH_PREFIX_SIZE + data.len());
    encode_u64_be(buf, data.len() as u64);
    buf.put_slice(data);
}

fn require(buf: &[u8], needed: usize) -> WireResult<()> {
    if buf.len() < needed {
        return Err(WireError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Preview a count byte
pub fn decode_u8(buf: &[u8]) -> WireResult<(u8, usize)> {
    require(buf, REP_COUNT_SIZE)?;
    Ok((buf[0], REP_COUNT_SIZE))
}

/// Preview a big-endian u64
pub fn decode_u64_be(buf: &[u8]) -> WireResult<(u64, usize)> {
    require(buf, LENGTH_PREFIX_SIZE)?;
    let mut raw = [0u8; LENGTH_PREFIX_SIZE];
    raw.copy_from_slice(&buf[..LENGTH_PREFIX_SIZE]);
    Ok((u64::from_be_bytes(raw), LENGTH_PREFIX_SIZE))
}

/// Preview `len` bytes as a UTF-8 string (no length prefix)
pub fn decode_utf8(buf: &[u8], len: usize) -> WireResult<(String, usize)> {
    require(buf, len)?;
    let s = std::str::from_utf8(&buf[..len]).map_err(|_| WireError::InvalidUtf8)?;
    Ok((s.to_owned(), len))
}

/// Preview a length-prefixed UTF-8 string
pub fn decode_str(buf: &[u8]) -> WireResult<(String, usize)> {
    let (len, prefix) = decode_length(buf)?;
    let (s, body) = decode_utf8(&buf[prefix..], len)?;
    Ok((s, prefix + body))
}

/// Preview a length-prefixed blob
pub fn decode_blob(buf: &[u8]) -> WireResult<(Bytes, usize)> {
    let (len, prefix) = decode_length(buf)?;
    require(&buf[prefix..], len)?;
    Ok((
        Bytes::copy_from_slice(&buf[prefix..prefix + len]),
        prefix + len,
    ))
}

/// Decode a length prefix, rejecting lengths that cannot be addressed
fn decode_length(buf: &[u8]) -> WireResult<(usize, usize)> {
    let (len, consumed) = decode_u64_be(buf)?;
    // A length beyond the address space can never be satisfied by any buffer
    let len = usize::try_from(len).map_err(|_| WireError::Truncated {
        needed: usize::MAX,
        available: buf.len(),
    })?;
    Ok((len, consumed))
}
