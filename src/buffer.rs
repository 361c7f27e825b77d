//! Owned file bytes with bounds-checked little-endian reads.
//!
//! A [`ByteBuffer`] is loaded once, up front, and every later access is a pure
//! in-memory read at an absolute offset.  Reads are typed by a [`Layout`]: a
//! single primitive (`u8`, `u16`, `u32`, `[u8; N]`) or a tuple of them packed
//! contiguously, decoded in declared order.
//!
//! ```
//! use b4u::ByteBuffer;
//!
//! let buf = ByteBuffer::from_bytes(vec![1, 0, 2, 0, 0, 0]);
//! let (a, b): (u16, u32) = buf.read(0)?;
//! assert_eq!((a, b), (1, 2));
//! # Ok::<(), b4u::buffer::ReadError>(())
//! ```
//!
//! # Absent buffers
//! A file that cannot be opened produces an *absent* buffer instead of an
//! error.  Every read on an absent buffer returns
//! [`ReadError::SourceUnavailable`], so callers can probe addresses without
//! branching on file presence first.

use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, warn};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Source file is missing or unreadable")]
    SourceUnavailable,
    #[error("Read of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },
}

// ── Layout ───────────────────────────────────────────────────────────────────

/// A fixed-size little-endian field sequence that can be decoded from bytes.
pub trait Layout: Sized {
    /// Packed size in bytes.
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;
}

impl Layout for u8 {
    const SIZE: usize = 1;
    fn decode(bytes: &[u8]) -> Self { bytes[0] }
}

impl Layout for u16 {
    const SIZE: usize = 2;
    fn decode(bytes: &[u8]) -> Self { LittleEndian::read_u16(bytes) }
}

impl Layout for u32 {
    const SIZE: usize = 4;
    fn decode(bytes: &[u8]) -> Self { LittleEndian::read_u32(bytes) }
}

impl<const N: usize> Layout for [u8; N] {
    const SIZE: usize = N;
    fn decode(bytes: &[u8]) -> Self {
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes[..N]);
        out
    }
}

macro_rules! tuple_layout {
    ($($t:ident),+) => {
        impl<$($t: Layout),+> Layout for ($($t,)+) {
            const SIZE: usize = 0 $(+ $t::SIZE)+;

            #[allow(unused_assignments)]
            fn decode(bytes: &[u8]) -> Self {
                let mut at = 0;
                ($({
                    let v = $t::decode(&bytes[at..at + $t::SIZE]);
                    at += $t::SIZE;
                    v
                },)+)
            }
        }
    };
}

tuple_layout!(A, B);
tuple_layout!(A, B, C);
tuple_layout!(A, B, C, D);
tuple_layout!(A, B, C, D, E);

// ── ByteBuffer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: Option<Vec<u8>>,
}

impl ByteBuffer {
    /// Read the whole file at `path`.  Missing or unreadable files yield an
    /// absent buffer; the file handle is closed before this returns.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(data) => {
                debug!("Loaded {} bytes from {}", data.len(), path.display());
                Self { data: Some(data) }
            }
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                Self::absent()
            }
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }

    pub fn absent() -> Self {
        Self { data: None }
    }

    pub fn is_absent(&self) -> bool {
        self.data.is_none()
    }

    /// Byte length; zero for an absent buffer.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds-checked view of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8], ReadError> {
        let data = self.data.as_deref().ok_or(ReadError::SourceUnavailable)?;
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok(&data[offset..end]),
            _ => Err(ReadError::OutOfBounds { offset, len, size: data.len() }),
        }
    }

    /// Decode a [`Layout`] at `offset`.
    #[inline]
    pub fn read<L: Layout>(&self, offset: usize) -> Result<L, ReadError> {
        self.slice(offset, L::SIZE).map(L::decode)
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, ReadError> {
        self.read(offset)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, ReadError> {
        self.read(offset)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}
