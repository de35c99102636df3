//! Request codes
//!
//! Values a process leaves in the request slot before trapping.

/// Read bytes from a device
pub const SYS_READ: u32 = 0;

/// Write bytes to a device
pub const SYS_WRITE: u32 = 1;

/// Give up the CPU and stay ready
pub const SYS_IDLE: u32 = 2;

/// Terminate the calling process
pub const SYS_EXIT: u32 = 3;
