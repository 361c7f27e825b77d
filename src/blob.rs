//! Length-prefixed binary payloads (card audio and images).
//!
//! ```text
//! [ len: u32 LE ][ reserved: 4 B ][ payload: len B ]
//! ```

use std::fs;
use std::io;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::buffer::{ByteBuffer, ReadError};

/// Bytes between the start of a blob record and its payload.
pub const BLOB_HEADER_LEN: usize = 8;

// ── MediaKind ────────────────────────────────────────────────────────────────

/// What a card's media payload holds, and how its output file is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    ForeignAudio,
    NativeAudio,
    Image,
}

impl MediaKind {
    /// Filename tail appended after `{prefix}{card_number}`.
    pub fn file_suffix(self) -> &'static str {
        match self {
            MediaKind::ForeignAudio => "_foreign.ogg",
            MediaKind::NativeAudio  => "_native.ogg",
            MediaKind::Image        => "_image.jpg",
        }
    }

    pub fn is_audio(self) -> bool {
        !matches!(self, MediaKind::Image)
    }
}

// ── Blob ─────────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// BLAKE3 of the payload, hex encoded.
    pub fn digest(&self) -> String {
        hex::encode(blake3::hash(&self.data).as_bytes())
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, &self.data)
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob").field("len", &self.data.len()).finish()
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Blob", 2)?;
        s.serialize_field("len", &self.data.len())?;
        s.serialize_field("blake3", &self.digest())?;
        s.end()
    }
}

/// Extract the blob whose record starts at `offset`.
pub fn extract_blob(buf: &ByteBuffer, offset: usize) -> Result<Blob, ReadError> {
    let len = buf.read_u32(offset)? as usize;
    let start = offset
        .checked_add(BLOB_HEADER_LEN)
        .ok_or(ReadError::OutOfBounds { offset, len: BLOB_HEADER_LEN, size: buf.len() })?;
    Ok(Blob::new(buf.slice(start, len)?.to_vec()))
}

/// Encode `payload` as a blob record.
pub fn encode_blob(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; BLOB_HEADER_LEN + payload.len()];
    LittleEndian::write_u32(&mut out[..4], payload.len() as u32);
    out[BLOB_HEADER_LEN..].copy_from_slice(payload);
    out
}
