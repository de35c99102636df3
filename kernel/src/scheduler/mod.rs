//! Process registry and queues
//!
//! The registry owns every process record and the four queues they move
//! between:
//!
//! | Queue             | Discipline | State            |
//! |-------------------|------------|------------------|
//! | Ready             | priority   | Ready            |
//! | Blocked           | FIFO       | Blocked          |
//! | Suspended-Ready   | priority   | ReadySuspended   |
//! | Suspended-Blocked | FIFO       | BlockedSuspended |
//!
//! The running process belongs to no queue.

mod queue;
mod registry;
mod table;

pub use queue::{Discipline, ProcessQueue, QueueKind};
pub use registry::{ProcessInfo, ProcessRegistry};

use ember_allocator::HeapError;
use thiserror::Error;

/// Process registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a process named '{0}' already exists")]
    DuplicateName(String),

    #[error("invalid process name '{0}': must be 3 to 20 characters")]
    InvalidName(String),

    #[error("invalid priority {0}: must be 0 to 9")]
    InvalidPriority(u8),

    #[error("no process named '{0}'")]
    NotFound(String),

    #[error("process '{0}' is running")]
    Running(String),

    #[error("stale process handle")]
    StaleHandle,

    #[error("no memory for process record: {0}")]
    OutOfMemory(HeapError),

    #[error("{queue:?} queue corrupted: {reason}")]
    Corrupt {
        queue: QueueKind,
        reason: &'static str,
    },
}

pub type Result<T> = core::result::Result<T, RegistryError>;
