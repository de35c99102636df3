//! Ember device drivers
//!
//! Only one device class exists today: the byte-stream serial port in
//! [`serial`]. Drivers never touch hardware directly; every register access
//! goes through the [`serial::Hardware`] trait so the same driver runs on a
//! PC-compatible port map or on the [`serial::LoopbackUart`] model.

pub mod serial;

pub use serial::{
    BaudRate, DeviceStatus, EventFlag, Hardware, IoBuffer, LoopbackUart, SerialPort,
};
