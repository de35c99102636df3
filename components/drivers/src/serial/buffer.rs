//! Transfer buffers shared between a process and the driver
//!
//! A process hands the driver an [`IoBuffer`] together with the number of
//! bytes it wants moved. The driver fills or drains the buffer, possibly from
//! interrupt context long after the request was issued, and finally writes
//! the actual byte count back.

use spin::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct BufferState {
    data: Vec<u8>,
    /// Requested count on entry, actual count after completion
    count: usize,
    /// Driver or scheduler error code if the transfer never ran
    error: Option<i32>,
}

/// Shared data buffer plus in/out count
#[derive(Debug, Clone)]
pub struct IoBuffer {
    state: Arc<Mutex<BufferState>>,
}

impl IoBuffer {
    /// Buffer for a read of up to `count` bytes
    pub fn for_read(count: usize) -> Self {
        Self::from_parts(vec![0; count], count)
    }

    /// Buffer holding `bytes`, all of which are to be written
    pub fn for_write(bytes: &[u8]) -> Self {
        Self::from_parts(bytes.to_vec(), bytes.len())
    }

    /// Buffer with explicit storage and requested count
    ///
    /// `count` may exceed the storage; such requests are rejected by the
    /// driver as an invalid count.
    pub fn from_parts(data: Vec<u8>, count: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BufferState {
                data,
                count,
                error: None,
            })),
        }
    }

    /// Bytes of storage behind the buffer
    pub fn capacity(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    pub fn set_count(&self, count: usize) {
        self.state.lock().count = count;
    }

    pub fn byte(&self, index: usize) -> Option<u8> {
        self.state.lock().data.get(index).copied()
    }

    pub fn store(&self, index: usize, byte: u8) {
        if let Some(slot) = self.state.lock().data.get_mut(index) {
            *slot = byte;
        }
    }

    /// The first `count()` bytes
    pub fn contents(&self) -> Vec<u8> {
        let state = self.state.lock();
        let end = state.count.min(state.data.len());
        state.data[..end].to_vec()
    }

    /// Mark the transfer as failed with `code`; the count drops to zero
    pub fn fail(&self, code: i32) {
        let mut state = self.state.lock();
        state.count = 0;
        state.error = Some(code);
    }

    pub fn error(&self) -> Option<i32> {
        self.state.lock().error
    }

    /// True when both handles refer to the same storage
    pub fn same_as(&self, other: &IoBuffer) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contents_follow_count() {
        let buffer = IoBuffer::for_write(b"hello");
        assert_eq!(buffer.contents(), b"hello");

        buffer.set_count(2);
        assert_eq!(buffer.contents(), b"he");
    }

    #[test]
    fn test_store_ignores_out_of_range() {
        let buffer = IoBuffer::for_read(2);
        buffer.store(0, b'a');
        buffer.store(5, b'z');
        assert_eq!(buffer.contents(), b"a\0");
    }

    #[test]
    fn test_fail_records_code() {
        let buffer = IoBuffer::for_read(4);
        buffer.fail(-304);
        assert_eq!(buffer.count(), 0);
        assert_eq!(buffer.error(), Some(-304));
    }
}
