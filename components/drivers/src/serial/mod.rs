//! Serial port driver (16550-compatible UART)
//!
//! ## Structure
//!
//! - [`regs`]: register offsets, bit definitions, baud rates
//! - [`hardware`]: port I/O and interrupt-gate traits the driver runs on
//! - [`SerialPort`]: open/close/read/write plus the interrupt handlers
//! - [`LoopbackUart`]: register-level device model with TX looped to RX
//!
//! ## State machine
//!
//! ```text
//!          read (unsatisfied)              write
//!   Idle ───────────────────▶ Reading   Idle ─────▶ Writing
//!    ▲                           │        ▲            │
//!    └── count reached / CR / LF ┘        └─ last byte ┘
//! ```
//!
//! Completion of either transfer raises the [`EventFlag`] handed to
//! [`SerialPort::open`].

mod buffer;
mod dcb;
mod error;
mod event;
pub mod hardware;
mod loopback;
mod port;
pub mod regs;
mod ring_buffer;

pub use buffer::IoBuffer;
pub use dcb::{DeviceStatus, RING_CAPACITY};
pub use error::{CloseError, OpenError, ReadError, WriteError};
pub use event::EventFlag;
pub use hardware::{Hardware, InterruptTable, PortIo};
pub use loopback::LoopbackUart;
pub use port::{SerialPort, HANDLER_GATE};
pub use regs::{BaudRate, InterruptCause, COM1};
pub use ring_buffer::ReceiveRing;
