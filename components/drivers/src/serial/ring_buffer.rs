//! Receive ring for bytes that arrive with no read outstanding
//!
//! The input interrupt handler stores into the ring whenever the device is
//! not Reading; the next `read` drains it before waiting for the line. A
//! full ring discards the incoming byte and counts it.

/// Fixed-capacity receive ring
pub struct ReceiveRing<const N: usize> {
    bytes: [u8; N],
    /// Next slot to store into
    head: usize,
    /// Oldest stored byte
    tail: usize,
    len: usize,
    /// Bytes discarded since the last clear
    dropped: usize,
}

impl<const N: usize> ReceiveRing<N> {
    /// Create an empty ring
    pub const fn new() -> Self {
        Self {
            bytes: [0; N],
            head: 0,
            tail: 0,
            len: 0,
            dropped: 0,
        }
    }

    /// Number of bytes waiting to be read
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes discarded because the ring was full
    #[inline]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Store a received byte
    ///
    /// Returns `false` if the ring was full and the byte was discarded.
    pub fn store(&mut self, byte: u8) -> bool {
        if self.len == N {
            self.dropped += 1;
            return false;
        }

        self.bytes[self.head] = byte;
        self.head = (self.head + 1) % N;
        self.len += 1;
        true
    }

    /// Take the oldest byte, if any
    pub fn take(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }

        let byte = self.bytes[self.tail];
        self.tail = (self.tail + 1) % N;
        self.len -= 1;
        Some(byte)
    }

    /// Forget every stored byte and reset the drop count (port open)
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
        self.dropped = 0;
    }
}
