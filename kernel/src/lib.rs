//! Ember Kernel
//!
//! A single-core kernel driven entirely by traps. Processes ask for service
//! through [`Kernel::sys_req`] and trap into [`Kernel::dispatch`], which
//! saves their context, acts on the request and resumes the next ready
//! process.
//!
//! # Architecture
//!
//! - `objects`: process control blocks
//! - `scheduler`: process registry and its four queues
//! - `io`: single-device I/O request scheduler
//! - `syscall`: request codes and the request slot
//! - `dispatcher`: the trap handler
//! - `kernel`: boot, the kernel context and shutdown
//! - `commands`: shell-level policy over the registry
//! - `config`: TOML boot configuration
//!
//! Memory for every record comes from an [`ember_allocator::MemoryCapability`];
//! the serial port is reached through [`ember_drivers::Hardware`], so the
//! whole kernel runs against [`ember_drivers::LoopbackUart`] on a host.

pub mod commands;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod io;
pub mod kernel;
pub mod objects;
pub mod scheduler;
pub mod syscall;

pub use commands::{CommandError, ShellCommands};
pub use config::{KernelConfig, MemoryMode, ProcessConfig, SerialConfig};
pub use context::{Context, CONTEXT_SIZE};
pub use error::{Fatal, KernelError};
pub use kernel::{Kernel, KernelMemory, DEVICE_RECORD_BYTES};
pub use objects::{Pcb, ProcessClass, ProcessId, ProcessState};
pub use scheduler::{ProcessInfo, ProcessRegistry, QueueKind, RegistryError};
pub use syscall::{numbers, DeviceId, OpCode, SyscallError, DEFAULT_DEVICE};
