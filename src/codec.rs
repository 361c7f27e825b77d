//! Text codecs: masked length-prefixed strings and fixed-width labels.
//!
//! # Masked strings
//! ```text
//! [ len: u16 LE ][ unit_0: u16 LE ] ... [ unit_{len-1}: u16 LE ]
//! ```
//! Every code unit is stored XOR [`STRING_MASK`].  The mask is applied to the
//! full 16-bit unit, so non-Latin scripts are masked the same way as ASCII.
//! A string pointer of zero (or below) means the field carries no text.
//!
//! # Fixed labels
//! Deck-detail labels are stored as [`FIXED_LABEL_WIDTH`] single-byte
//! characters padded with NUL.

use byteorder::{ByteOrder, LittleEndian};

use crate::buffer::{ByteBuffer, ReadError};

/// XOR mask applied to every UTF-16 code unit of a stored string.
pub const STRING_MASK: u16 = 0x7E;

/// Width of the NUL-padded label field in a deck-detail node.
pub const FIXED_LABEL_WIDTH: usize = 24;

/// Decode the masked string at `offset`.
///
/// Offsets `<= 0` return an empty string without touching the buffer.
/// Unpaired surrogates decode to U+FFFD.
pub fn decode_string(buf: &ByteBuffer, offset: i64) -> Result<String, ReadError> {
    if offset <= 0 {
        return Ok(String::new());
    }
    let offset = usize::try_from(offset)
        .map_err(|_| ReadError::OutOfBounds { offset: usize::MAX, len: 2, size: buf.len() })?;

    let count = buf.read_u16(offset)? as usize;
    let body = buf.slice(offset + 2, count * 2)?;
    let units = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]) ^ STRING_MASK);

    Ok(char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

/// Encode `text` in the masked string layout.
///
/// Text longer than `u16::MAX` code units is truncated to fit the prefix.
pub fn encode_string(text: &str) -> Vec<u8> {
    let masked: Vec<u16> = text
        .encode_utf16()
        .take(u16::MAX as usize)
        .map(|unit| unit ^ STRING_MASK)
        .collect();
    let mut out = vec![0u8; 2 + masked.len() * 2];
    LittleEndian::write_u16(&mut out[..2], masked.len() as u16);
    LittleEndian::write_u16_into(&masked, &mut out[2..]);
    out
}

/// Decode a NUL-padded single-byte label of `width` bytes at `offset`.
/// Only trailing NULs are padding; interior bytes are kept.
pub fn decode_fixed(buf: &ByteBuffer, offset: usize, width: usize) -> Result<String, ReadError> {
    let raw = buf.slice(offset, width)?;
    let label: String = raw.iter().map(|&b| b as char).collect();
    Ok(label.trim_end_matches('\0').to_owned())
}

/// Encode a label into a NUL-padded field of `width` bytes.  Longer labels
/// are cut to `width`.
pub fn encode_fixed(label: &str, width: usize) -> Vec<u8> {
    let mut out: Vec<u8> = label.bytes().take(width).collect();
    out.resize(width, 0);
    out
}
