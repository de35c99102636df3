//! Ember memory allocators
//!
//! Every dynamic record in the kernel (process records, queued I/O requests,
//! device records) is obtained through the [`MemoryCapability`] trait. Two
//! implementations are provided:
//!
//! - [`Heap`]: first-fit allocator with boundary tags and coalescing
//! - [`BumpMemory`]: never frees; used before the heap is brought up
//!
//! ## Addresses
//!
//! Addresses handed out are byte offsets into the managed region. For the
//! heap they always point at the payload, just past the block header.

mod block;
mod bump;
mod heap;

pub use block::{BlockKind, HEADER_SIZE, OVERHEAD, TRAILER_SIZE};
pub use bump::BumpMemory;
pub use heap::{BlockInfo, Heap};

use thiserror::Error;

/// Allocator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("zero-sized allocation request")]
    ZeroSized,

    #[error("out of memory: requested {requested} bytes, largest free block is {largest} bytes")]
    OutOfMemory { requested: usize, largest: usize },

    #[error("address {0:#x} is not an allocated block")]
    InvalidAddress(usize),

    #[error("region of {0} bytes cannot hold a single block")]
    RegionTooSmall(usize),

    #[error("region of {0} bytes exceeds 32-bit block addressing")]
    RegionTooLarge(usize),

    #[error("this memory capability never frees")]
    FreeUnsupported,

    #[error("heap corrupted at offset {offset:#x}: {reason}")]
    Corrupt { offset: usize, reason: &'static str },
}

pub type Result<T> = core::result::Result<T, HeapError>;

/// Source of dynamic memory for kernel records
///
/// The kernel owns one capability, chosen at boot, and lends it to every
/// operation that creates or destroys a record.
pub trait MemoryCapability {
    /// Reserve `bytes` bytes and return the address of the usable region.
    fn allocate(&mut self, bytes: usize) -> Result<usize>;

    /// Return a region previously obtained from [`MemoryCapability::allocate`].
    fn free(&mut self, address: usize) -> Result<()>;
}
