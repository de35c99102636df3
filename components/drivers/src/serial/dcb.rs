//! Device control block

use super::buffer::IoBuffer;
use super::event::EventFlag;
use super::ring_buffer::ReceiveRing;

/// Receive ring buffer capacity in bytes
pub const RING_CAPACITY: usize = 200;

/// Transfer state of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Idle,
    Reading,
    Writing,
}

/// One direction of an in-progress transfer
#[derive(Debug, Default)]
pub(crate) struct Transfer {
    pub buffer: Option<IoBuffer>,
    pub requested: usize,
    pub done: usize,
}

impl Transfer {
    pub fn begin(buffer: &IoBuffer, requested: usize) -> Self {
        Self {
            buffer: Some(buffer.clone()),
            requested,
            done: 0,
        }
    }

    #[inline]
    pub fn is_satisfied(&self) -> bool {
        self.done >= self.requested
    }
}

/// Per-device driver state
pub(crate) struct Dcb {
    pub open: bool,
    pub event: Option<EventFlag>,
    pub status: DeviceStatus,
    pub input: Transfer,
    pub output: Transfer,
    pub ring: ReceiveRing<RING_CAPACITY>,
}

impl Dcb {
    pub const fn new() -> Self {
        Self {
            open: false,
            event: None,
            status: DeviceStatus::Idle,
            input: Transfer {
                buffer: None,
                requested: 0,
                done: 0,
            },
            output: Transfer {
                buffer: None,
                requested: 0,
                done: 0,
            },
            ring: ReceiveRing::new(),
        }
    }

    /// Finish the current read: publish the count and raise the flag.
    pub fn complete_read(&mut self) {
        if let Some(buffer) = self.input.buffer.take() {
            buffer.set_count(self.input.done);
        }
        self.status = DeviceStatus::Idle;
        self.raise();
    }

    /// Finish the current write: publish the count and raise the flag.
    pub fn complete_write(&mut self) {
        if let Some(buffer) = self.output.buffer.take() {
            buffer.set_count(self.output.done);
        }
        self.status = DeviceStatus::Idle;
        self.raise();
    }

    fn raise(&self) {
        if let Some(event) = &self.event {
            event.set();
        }
    }

    pub fn clear_event(&self) {
        if let Some(event) = &self.event {
            event.clear();
        }
    }
}
