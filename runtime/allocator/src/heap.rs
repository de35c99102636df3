//! First-fit heap with boundary-tag coalescing
//!
//! The heap manages one contiguous byte region. Block headers are threaded
//! into two address-ordered doubly-linked lists (allocated and free) using
//! the link words stored in the headers themselves.
//!
//! ## Invariants
//!
//! - blocks tile the region exactly, headers at increasing offsets
//! - every trailer agrees with its header on type and size
//! - no two free blocks are adjacent after [`Heap::free`] returns
//! - both lists are sorted by address
//!
//! [`Heap::verify`] checks all of the above.

use crate::block::{decode_link, encode_link, BlockKind, ChunkHeader, ChunkTrailer};
use crate::block::{HEADER_SIZE, OVERHEAD, TRAILER_SIZE};
use crate::{HeapError, MemoryCapability, Result};

/// Snapshot of one block, as reported by [`Heap::show_allocated`] and
/// [`Heap::show_free`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload address (what `allocate` returned for allocated blocks)
    pub address: usize,
    /// Payload size in bytes
    pub size: usize,
    pub kind: BlockKind,
}

/// Which header list an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum List {
    Allocated,
    Free,
}

/// First-fit boundary-tag heap
pub struct Heap {
    region: Vec<u8>,
    allocated_head: Option<usize>,
    free_head: Option<usize>,
}

impl Heap {
    /// Create a heap managing `total_bytes` bytes as one free block.
    pub fn new(total_bytes: usize) -> Result<Self> {
        if total_bytes <= OVERHEAD {
            return Err(HeapError::RegionTooSmall(total_bytes));
        }
        if total_bytes > u32::MAX as usize {
            return Err(HeapError::RegionTooLarge(total_bytes));
        }

        let mut heap = Self {
            region: vec![0; total_bytes],
            allocated_head: None,
            free_head: None,
        };
        heap.write_block(0, BlockKind::Free, total_bytes - OVERHEAD);
        heap.free_head = Some(0);

        log::info!("[heap] initialized: {} bytes, {} usable", total_bytes, total_bytes - OVERHEAD);
        Ok(heap)
    }

    /// Total bytes under management, bookkeeping included
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Allocate `bytes` bytes using the first free block that fits.
    ///
    /// A block fits when its payload can hold the request plus the tags of
    /// the free remainder. The block is split unless the remainder payload
    /// would be zero, in which case the whole block is handed out.
    ///
    /// Returns the payload address.
    pub fn allocate(&mut self, bytes: usize) -> Result<usize> {
        if bytes == 0 {
            return Err(HeapError::ZeroSized);
        }

        let needed = bytes.checked_add(OVERHEAD).ok_or_else(|| HeapError::OutOfMemory {
            requested: bytes,
            largest: self.largest_free(),
        })?;

        let mut cursor = self.free_head;
        let found = loop {
            match cursor {
                Some(at) => {
                    let header = self.header(at);
                    if header.size() >= needed {
                        break Some((at, header.size()));
                    }
                    cursor = decode_link(header.next);
                }
                None => break None,
            }
        };

        let Some((at, size)) = found else {
            log::warn!("[heap] out of memory: {} bytes requested", bytes);
            return Err(HeapError::OutOfMemory {
                requested: bytes,
                largest: self.largest_free(),
            });
        };

        self.unlink(List::Free, at);

        let remainder = size - needed;
        let granted = if remainder == 0 { size } else { bytes };

        self.write_block(at, BlockKind::Allocated, granted);
        self.link_ordered(List::Allocated, at);

        if remainder > 0 {
            let split = at + OVERHEAD + granted;
            self.write_block(split, BlockKind::Free, remainder);
            self.link_ordered(List::Free, split);
        }

        log::debug!("[heap] allocate {} bytes -> {:#x}", bytes, at + HEADER_SIZE);
        Ok(at + HEADER_SIZE)
    }

    /// Return a block to the free list, merging it with free neighbours.
    pub fn free(&mut self, address: usize) -> Result<()> {
        let at = address
            .checked_sub(HEADER_SIZE)
            .ok_or(HeapError::InvalidAddress(address))?;

        if !self.is_listed(List::Allocated, at) {
            log::warn!("[heap] free of unknown address {:#x}", address);
            return Err(HeapError::InvalidAddress(address));
        }

        self.unlink(List::Allocated, at);
        let size = self.header(at).size();
        self.write_block(at, BlockKind::Free, size);
        self.link_ordered(List::Free, at);

        let mut at = at;

        // Lower neighbour: its trailer sits right below our header
        if at >= TRAILER_SIZE {
            let below = ChunkTrailer::read(&self.region, at - TRAILER_SIZE);
            if below.kind() == Some(BlockKind::Free) {
                let lower = at - TRAILER_SIZE - below.size as usize - HEADER_SIZE;
                at = self.merge(lower, at);
            }
        }

        // Upper neighbour: its header sits right past our trailer
        let upper = self.header(at).end(at);
        if upper < self.region.len() && self.header(upper).kind() == Some(BlockKind::Free) {
            self.merge(at, upper);
        }

        log::debug!("[heap] free {:#x}", address);
        Ok(())
    }

    /// True when no block is allocated
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_head.is_none()
    }

    /// Allocated blocks in address order
    pub fn show_allocated(&self) -> Vec<BlockInfo> {
        self.blocks(List::Allocated)
    }

    /// Free blocks in address order
    pub fn show_free(&self) -> Vec<BlockInfo> {
        self.blocks(List::Free)
    }

    /// Sum of free payload bytes
    pub fn free_bytes(&self) -> usize {
        self.show_free().iter().map(|block| block.size).sum()
    }

    /// Largest request that could be satisfied right now
    pub fn largest_free(&self) -> usize {
        self.show_free()
            .iter()
            .map(|block| block.size.saturating_sub(OVERHEAD))
            .max()
            .unwrap_or(0)
    }

    /// Check every structural invariant of the region.
    pub fn verify(&self) -> Result<()> {
        let mut at = 0;
        let mut previous_free = false;
        let mut tiled_free = Vec::new();
        let mut tiled_allocated = Vec::new();

        while at < self.region.len() {
            if at + OVERHEAD > self.region.len() {
                return Err(corrupt(at, "block tags run past the region"));
            }
            let header = self.header(at);
            if header.start as usize != at {
                return Err(corrupt(at, "header start does not match its offset"));
            }
            let kind = header.kind().ok_or_else(|| corrupt(at, "unknown header type"))?;
            if header.end(at) > self.region.len() {
                return Err(corrupt(at, "block runs past the region"));
            }
            let trailer = ChunkTrailer::read(&self.region, header.trailer_at(at));
            if trailer.kind() != Some(kind) || trailer.size != header.size {
                return Err(corrupt(at, "trailer disagrees with header"));
            }

            match kind {
                BlockKind::Free => {
                    if previous_free {
                        return Err(corrupt(at, "adjacent free blocks"));
                    }
                    tiled_free.push(at);
                }
                BlockKind::Allocated => tiled_allocated.push(at),
            }
            previous_free = kind == BlockKind::Free;
            at = header.end(at);
        }

        if at != self.region.len() {
            return Err(corrupt(at, "blocks do not tile the region"));
        }

        self.verify_list(List::Free, &tiled_free)?;
        self.verify_list(List::Allocated, &tiled_allocated)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn header(&self, at: usize) -> ChunkHeader {
        ChunkHeader::read(&self.region, at)
    }

    fn head(&self, list: List) -> Option<usize> {
        match list {
            List::Allocated => self.allocated_head,
            List::Free => self.free_head,
        }
    }

    fn set_head(&mut self, list: List, head: Option<usize>) {
        match list {
            List::Allocated => self.allocated_head = head,
            List::Free => self.free_head = head,
        }
    }

    /// Rewrite both tags of a block, leaving its links unset.
    fn write_block(&mut self, at: usize, kind: BlockKind, size: usize) {
        let header = ChunkHeader::new(kind, at, size);
        header.write(&mut self.region, at);
        ChunkTrailer::new(kind, size).write(&mut self.region, header.trailer_at(at));
    }

    fn set_links(&mut self, at: usize, next: Option<usize>, prev: Option<usize>) {
        let mut header = self.header(at);
        header.next = encode_link(next);
        header.prev = encode_link(prev);
        header.write(&mut self.region, at);
    }

    fn set_next(&mut self, at: usize, next: Option<usize>) {
        let mut header = self.header(at);
        header.next = encode_link(next);
        header.write(&mut self.region, at);
    }

    fn set_prev(&mut self, at: usize, prev: Option<usize>) {
        let mut header = self.header(at);
        header.prev = encode_link(prev);
        header.write(&mut self.region, at);
    }

    /// Insert a header into a list keeping address order.
    fn link_ordered(&mut self, list: List, at: usize) {
        let mut prev = None;
        let mut cursor = self.head(list);
        while let Some(node) = cursor {
            if node > at {
                break;
            }
            prev = Some(node);
            cursor = decode_link(self.header(node).next);
        }

        self.set_links(at, cursor, prev);
        match prev {
            Some(p) => self.set_next(p, Some(at)),
            None => self.set_head(list, Some(at)),
        }
        if let Some(n) = cursor {
            self.set_prev(n, Some(at));
        }
    }

    fn unlink(&mut self, list: List, at: usize) {
        let header = self.header(at);
        let next = decode_link(header.next);
        let prev = decode_link(header.prev);

        match prev {
            Some(p) => self.set_next(p, next),
            None => self.set_head(list, next),
        }
        if let Some(n) = next {
            self.set_prev(n, prev);
        }
        self.set_links(at, None, None);
    }

    fn is_listed(&self, list: List, at: usize) -> bool {
        let mut cursor = self.head(list);
        while let Some(node) = cursor {
            if node == at {
                return true;
            }
            if node > at {
                return false;
            }
            cursor = decode_link(self.header(node).next);
        }
        false
    }

    /// Fold the free block at `upper` into the free block at `lower`.
    /// Returns the offset of the merged block.
    fn merge(&mut self, lower: usize, upper: usize) -> usize {
        let upper_size = self.header(upper).size();
        self.unlink(List::Free, upper);

        let mut header = self.header(lower);
        let merged = header.size() + OVERHEAD + upper_size;
        header.size = merged as u32;
        header.write(&mut self.region, lower);
        ChunkTrailer::new(BlockKind::Free, merged).write(&mut self.region, header.trailer_at(lower));

        log::trace!("[heap] merged {:#x} into {:#x} ({} bytes)", upper, lower, merged);
        lower
    }

    fn blocks(&self, list: List) -> Vec<BlockInfo> {
        let mut blocks = Vec::new();
        let mut cursor = self.head(list);
        while let Some(at) = cursor {
            let header = self.header(at);
            blocks.push(BlockInfo {
                address: at + HEADER_SIZE,
                size: header.size(),
                kind: match list {
                    List::Allocated => BlockKind::Allocated,
                    List::Free => BlockKind::Free,
                },
            });
            cursor = decode_link(header.next);
        }
        blocks
    }

    fn verify_list(&self, list: List, expected: &[usize]) -> Result<()> {
        let mut seen = Vec::with_capacity(expected.len());
        let mut prev = None;
        let mut cursor = self.head(list);

        while let Some(at) = cursor {
            if seen.len() > expected.len() {
                return Err(corrupt(at, "list is longer than the blocks it indexes"));
            }
            let header = self.header(at);
            if decode_link(header.prev) != prev {
                return Err(corrupt(at, "back link does not match"));
            }
            seen.push(at);
            prev = Some(at);
            cursor = decode_link(header.next);
        }

        if seen != expected {
            let offset = seen.first().copied().unwrap_or(0);
            return Err(corrupt(offset, "list does not match the blocks of its type"));
        }
        Ok(())
    }
}

fn corrupt(offset: usize, reason: &'static str) -> HeapError {
    HeapError::Corrupt { offset, reason }
}

impl MemoryCapability for Heap {
    fn allocate(&mut self, bytes: usize) -> Result<usize> {
        Heap::allocate(self, bytes)
    }

    fn free(&mut self, address: usize) -> Result<()> {
        Heap::free(self, address)
    }
}

impl core::fmt::Debug for Heap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap")
            .field("capacity", &self.region.len())
            .field("allocated", &self.show_allocated().len())
            .field("free_bytes", &self.free_bytes())
            .finish()
    }
}
