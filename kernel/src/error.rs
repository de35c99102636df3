//! Kernel error types

use std::path::PathBuf;

use ember_allocator::HeapError;
use ember_drivers::serial::{CloseError, OpenError};
use thiserror::Error;

use crate::scheduler::RegistryError;
use crate::syscall::SyscallError;

/// Unrecoverable dispatcher conditions
///
/// Once raised the kernel is halted: every later dispatch reports the same
/// fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fatal {
    #[error("trap without a valid request code (got {0:?})")]
    InvalidRequest(Option<u32>),

    #[error("no process is ready to run")]
    EmptyReadyQueue,
}

/// Boot, configuration and shutdown errors
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("memory error: {0}")]
    Heap(#[from] HeapError),

    #[error("heap holds allocated blocks {0}")]
    HeapNotEmpty(&'static str),

    #[error("serial port open failed ({code}): {0}", code = .0.code())]
    Open(#[from] OpenError),

    #[error("serial port close failed ({code}): {0}", code = .0.code())]
    Close(#[from] CloseError),

    #[error("process registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("kernel halted: {0}")]
    Fatal(#[from] Fatal),

    #[error("system request rejected ({code}): {0}", code = .0.code())]
    Syscall(#[from] SyscallError),

    #[error("failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = core::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_show_their_code() {
        let open = KernelError::from(OpenError::InvalidBaudRate(1234));
        assert_eq!(open.to_string(), "serial port open failed (-102): unsupported baud rate 1234");

        let close = KernelError::from(CloseError::NotOpen);
        assert_eq!(close.to_string(), "serial port close failed (-201): port not open");
    }

    #[test]
    fn test_syscall_error_shows_its_code() {
        let err = KernelError::from(SyscallError::InvalidOperation(9));
        assert_eq!(err.to_string(), "system request rejected (-3): invalid operation code 9");
    }
}
