//! Boundary tags
//!
//! Every block in the heap region is laid out as
//!
//! ```text
//! +----------------+------------------+---------------+
//! | ChunkHeader    | payload (size)   | ChunkTrailer  |
//! | 20 bytes       |                  | 8 bytes       |
//! +----------------+------------------+---------------+
//! ```
//!
//! Both tags are stored inside the managed bytes as little-endian 32-bit
//! words. The header carries the list links; the trailer lets a block find
//! its lower neighbour by looking just below its own header.

use static_assertions::{assert_eq_size, const_assert_eq};

/// Encoded "no link" value for header next/prev words
pub(crate) const NIL: u32 = u32::MAX;

/// Size of the block header in bytes
pub const HEADER_SIZE: usize = core::mem::size_of::<ChunkHeader>();

/// Size of the block trailer in bytes
pub const TRAILER_SIZE: usize = core::mem::size_of::<ChunkTrailer>();

/// Bookkeeping bytes consumed by every block
pub const OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Block type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BlockKind {
    Free = 0,
    Allocated = 1,
}

impl BlockKind {
    fn from_word(word: u32) -> Option<Self> {
        match word {
            0 => Some(BlockKind::Free),
            1 => Some(BlockKind::Allocated),
            _ => None,
        }
    }
}

/// Chunk control block, at the low end of every block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub kind: u32,
    /// Offset of this header; lets a trailer walk back to it
    pub start: u32,
    /// Payload bytes between header and trailer
    pub size: u32,
    pub next: u32,
    pub prev: u32,
}

/// Limit control block, at the high end of every block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkTrailer {
    pub kind: u32,
    pub size: u32,
}

assert_eq_size!(ChunkHeader, [u8; 20]);
assert_eq_size!(ChunkTrailer, [u8; 8]);
const_assert_eq!(OVERHEAD, 28);

fn read_word(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

fn write_word(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn encode_link(link: Option<usize>) -> u32 {
    link.map_or(NIL, |offset| offset as u32)
}

pub(crate) fn decode_link(word: u32) -> Option<usize> {
    (word != NIL).then_some(word as usize)
}

impl ChunkHeader {
    pub fn new(kind: BlockKind, start: usize, size: usize) -> Self {
        Self {
            kind: kind as u32,
            start: start as u32,
            size: size as u32,
            next: NIL,
            prev: NIL,
        }
    }

    pub fn read(bytes: &[u8], at: usize) -> Self {
        Self {
            kind: read_word(bytes, at),
            start: read_word(bytes, at + 4),
            size: read_word(bytes, at + 8),
            next: read_word(bytes, at + 12),
            prev: read_word(bytes, at + 16),
        }
    }

    pub fn write(&self, bytes: &mut [u8], at: usize) {
        write_word(bytes, at, self.kind);
        write_word(bytes, at + 4, self.start);
        write_word(bytes, at + 8, self.size);
        write_word(bytes, at + 12, self.next);
        write_word(bytes, at + 16, self.prev);
    }

    #[inline]
    pub fn kind(&self) -> Option<BlockKind> {
        BlockKind::from_word(self.kind)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Offset of the trailer that closes this block
    #[inline]
    pub fn trailer_at(&self, at: usize) -> usize {
        at + HEADER_SIZE + self.size()
    }

    /// Offset just past the trailer, where the next block's header begins
    #[inline]
    pub fn end(&self, at: usize) -> usize {
        self.trailer_at(at) + TRAILER_SIZE
    }
}

impl ChunkTrailer {
    pub fn new(kind: BlockKind, size: usize) -> Self {
        Self {
            kind: kind as u32,
            size: size as u32,
        }
    }

    pub fn read(bytes: &[u8], at: usize) -> Self {
        Self {
            kind: read_word(bytes, at),
            size: read_word(bytes, at + 4),
        }
    }

    pub fn write(&self, bytes: &mut [u8], at: usize) {
        write_word(bytes, at, self.kind);
        write_word(bytes, at + 4, self.size);
    }

    #[inline]
    pub fn kind(&self) -> Option<BlockKind> {
        BlockKind::from_word(self.kind)
    }
}
