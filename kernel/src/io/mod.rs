//! Device I/O requests
//!
//! Processes never call the driver directly. Their READ and WRITE traps
//! become [`IoRequest`]s handed to the [`IoScheduler`], which keeps one
//! request in flight per device and queues the rest in arrival order.

mod scheduler;

pub use scheduler::{IoScheduler, Submitted, IO_REQUEST_BYTES};

use ember_allocator::HeapError;
use ember_drivers::IoBuffer;
use thiserror::Error;

use crate::objects::ProcessId;
use crate::syscall::{DeviceId, OpCode};

/// I/O scheduler errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("no memory to queue I/O request: {0}")]
    OutOfMemory(HeapError),

    #[error("no device with id {0}")]
    UnknownDevice(DeviceId),
}

impl IoError {
    /// Code recorded in the caller's buffer when a request is refused
    pub fn code(&self) -> i32 {
        match self {
            IoError::OutOfMemory(_) => -501,
            IoError::UnknownDevice(_) => -502,
        }
    }
}

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

impl TryFrom<OpCode> for IoOp {
    type Error = OpCode;

    fn try_from(op: OpCode) -> Result<Self, OpCode> {
        match op {
            OpCode::Read => Ok(IoOp::Read),
            OpCode::Write => Ok(IoOp::Write),
            other => Err(other),
        }
    }
}

/// One transfer on behalf of a blocked process
#[derive(Debug, Clone)]
pub struct IoRequest {
    pub op: IoOp,
    pub device: DeviceId,
    pub buffer: IoBuffer,
    pub owner: ProcessId,
    /// Block reserved while the request waits in the pending queue
    pub(crate) record: Option<usize>,
}

impl IoRequest {
    pub fn new(op: IoOp, device: DeviceId, buffer: IoBuffer, owner: ProcessId) -> Self {
        Self {
            op,
            device,
            buffer,
            owner,
            record: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transfers_map_to_io_ops() {
        assert_eq!(IoOp::try_from(OpCode::Read), Ok(IoOp::Read));
        assert_eq!(IoOp::try_from(OpCode::Write), Ok(IoOp::Write));
        assert_eq!(IoOp::try_from(OpCode::Idle), Err(OpCode::Idle));
        assert_eq!(IoOp::try_from(OpCode::Exit), Err(OpCode::Exit));
    }
}
