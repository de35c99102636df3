//! System request interface
//!
//! A process asks for service by filling the [`RequestSlot`] and trapping
//! into the dispatcher. `READ` and `WRITE` arguments are validated before
//! the trap; anything that fails validation is reported synchronously and
//! never reaches the dispatcher.

pub mod numbers;

use ember_drivers::IoBuffer;
use thiserror::Error;

/// Requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Read,
    Write,
    Idle,
    Exit,
}

impl OpCode {
    #[inline]
    pub fn code(self) -> u32 {
        match self {
            OpCode::Read => numbers::SYS_READ,
            OpCode::Write => numbers::SYS_WRITE,
            OpCode::Idle => numbers::SYS_IDLE,
            OpCode::Exit => numbers::SYS_EXIT,
        }
    }

    /// True for requests serviced by a device
    #[inline]
    pub fn is_io(self) -> bool {
        matches!(self, OpCode::Read | OpCode::Write)
    }
}

impl TryFrom<u32> for OpCode {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, u32> {
        match code {
            numbers::SYS_READ => Ok(OpCode::Read),
            numbers::SYS_WRITE => Ok(OpCode::Write),
            numbers::SYS_IDLE => Ok(OpCode::Idle),
            numbers::SYS_EXIT => Ok(OpCode::Exit),
            other => Err(other),
        }
    }
}

/// Device a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u8);

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The serial port opened at boot
pub const DEFAULT_DEVICE: DeviceId = DeviceId(1);

/// Errors reported to the caller without trapping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyscallError {
    #[error("invalid buffer")]
    InvalidBuffer,

    #[error("invalid count")]
    InvalidCount,

    #[error("invalid operation code {0}")]
    InvalidOperation(u32),
}

impl SyscallError {
    pub fn code(&self) -> i32 {
        match self {
            SyscallError::InvalidBuffer => -1,
            SyscallError::InvalidCount => -2,
            SyscallError::InvalidOperation(_) => -3,
        }
    }
}

/// Parameters of one trap
#[derive(Debug, Clone)]
pub struct Request {
    /// Raw code; decoded by the dispatcher
    pub op_code: u32,
    pub device: DeviceId,
    pub buffer: Option<IoBuffer>,
}

impl Request {
    /// Request with no device transfer
    pub fn control(op: OpCode) -> Self {
        Self {
            op_code: op.code(),
            device: DEFAULT_DEVICE,
            buffer: None,
        }
    }

    /// Check the arguments of a request before it is posted.
    pub fn validate(&self) -> Result<OpCode, SyscallError> {
        let op = OpCode::try_from(self.op_code).map_err(SyscallError::InvalidOperation)?;
        if op.is_io() {
            let buffer = self.buffer.as_ref().ok_or(SyscallError::InvalidBuffer)?;
            if buffer.capacity() == 0 {
                return Err(SyscallError::InvalidBuffer);
            }
            if buffer.count() == 0 || buffer.count() > buffer.capacity() {
                return Err(SyscallError::InvalidCount);
            }
        }
        Ok(op)
    }
}

/// Where the running process leaves its request for the dispatcher
#[derive(Debug, Default)]
pub struct RequestSlot {
    pending: Option<Request>,
}

impl RequestSlot {
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Replace whatever was posted before
    pub fn post(&mut self, request: Request) {
        self.pending = Some(request);
    }

    /// Consume the posted request
    pub fn take(&mut self) -> Option<Request> {
        self.pending.take()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}
