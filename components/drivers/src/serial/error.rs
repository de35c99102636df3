//! Driver error families
//!
//! Each operation has its own error enum; `code()` gives the numeric status
//! a process sees. The ranges are disjoint per family.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("invalid event flag reference")]
    InvalidEventFlag,

    #[error("unsupported baud rate {0}")]
    InvalidBaudRate(u32),

    #[error("port already open")]
    AlreadyOpen,
}

impl OpenError {
    pub fn code(&self) -> i32 {
        match self {
            OpenError::InvalidEventFlag => -101,
            OpenError::InvalidBaudRate(_) => -102,
            OpenError::AlreadyOpen => -103,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CloseError {
    #[error("port not open")]
    NotOpen,
}

impl CloseError {
    pub fn code(&self) -> i32 {
        match self {
            CloseError::NotOpen => -201,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("port not open")]
    NotOpen,

    #[error("invalid buffer")]
    InvalidBuffer,

    #[error("invalid count {0}")]
    InvalidCount(usize),

    #[error("device busy")]
    Busy,
}

impl ReadError {
    pub fn code(&self) -> i32 {
        match self {
            ReadError::NotOpen => -301,
            ReadError::InvalidBuffer => -302,
            ReadError::InvalidCount(_) => -303,
            ReadError::Busy => -304,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("port not open")]
    NotOpen,

    #[error("invalid buffer")]
    InvalidBuffer,

    #[error("invalid count {0}")]
    InvalidCount(usize),

    #[error("device busy")]
    Busy,
}

impl WriteError {
    pub fn code(&self) -> i32 {
        match self {
            WriteError::NotOpen => -401,
            WriteError::InvalidBuffer => -402,
            WriteError::InvalidCount(_) => -403,
            WriteError::Busy => -404,
        }
    }
}
