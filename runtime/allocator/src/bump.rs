//! Bump memory
//!
//! Hands out consecutive regions and never reclaims them. This is the
//! memory mode the kernel runs in before the heap is brought up, and the
//! one selected by `memory = "bump"` in the kernel configuration.

use crate::{HeapError, MemoryCapability, Result};

/// Never-freeing memory capability
#[derive(Debug)]
pub struct BumpMemory {
    capacity: usize,
    next: usize,
    allocations: usize,
}

impl BumpMemory {
    /// Create a bump region of `capacity` bytes
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next: 0,
            allocations: 0,
        }
    }

    /// Bytes handed out so far
    #[inline]
    pub fn used(&self) -> usize {
        self.next
    }

    /// Number of successful allocations
    #[inline]
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

impl MemoryCapability for BumpMemory {
    fn allocate(&mut self, bytes: usize) -> Result<usize> {
        if bytes == 0 {
            return Err(HeapError::ZeroSized);
        }

        let start = self.next;
        let end = start
            .checked_add(bytes)
            .filter(|end| *end <= self.capacity)
            .ok_or(HeapError::OutOfMemory {
                requested: bytes,
                largest: self.capacity - self.next,
            })?;

        self.next = end;
        self.allocations += 1;
        Ok(start)
    }

    fn free(&mut self, address: usize) -> Result<()> {
        log::warn!("[bump] free({:#x}) ignored: bump memory never frees", address);
        Err(HeapError::FreeUnsupported)
    }
}
