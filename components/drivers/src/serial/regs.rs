//! 16550 UART and 8259 PIC register layout

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// First serial port base
pub const COM1: u16 = 0x3F8;

/// UART register offsets from the port base
pub const RBR: u16 = 0; // Receiver Buffer (read, DLAB=0)
pub const THR: u16 = 0; // Transmitter Holding (write, DLAB=0)
pub const DLL: u16 = 0; // Divisor Latch Low (DLAB=1)
pub const IER: u16 = 1; // Interrupt Enable (DLAB=0)
pub const DLM: u16 = 1; // Divisor Latch High (DLAB=1)
pub const IIR: u16 = 2; // Interrupt Identification (read)
pub const FCR: u16 = 2; // FIFO Control (write)
pub const LCR: u16 = 3; // Line Control
pub const MCR: u16 = 4; // Modem Control
pub const LSR: u16 = 5; // Line Status
pub const MSR: u16 = 6; // Modem Status
pub const SCR: u16 = 7; // Scratch

/// Number of registers decoded by the UART
pub const REGISTER_SPAN: u16 = 8;

/// Master PIC ports
pub const PIC_COMMAND: u16 = 0x20;
pub const PIC_MASK: u16 = 0x21;

/// Non-specific end-of-interrupt command
pub const EOI: u8 = 0x20;

/// Vector the master PIC delivers IRQ 0 on
pub const PIC_VECTOR_BASE: u8 = 0x20;

/// PIC level (IRQ line) COM1 is wired to
pub const SERIAL_IRQ_LEVEL: u8 = 4;

/// IVT vector of the COM1 interrupt
pub const SERIAL_VECTOR: u8 = 0x24;

const_assert_eq!(SERIAL_VECTOR, PIC_VECTOR_BASE + SERIAL_IRQ_LEVEL);

/// UART input clock divided by 16
pub const BASE_CLOCK: u32 = 115_200;

bitflags! {
    /// Interrupt Enable Register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptEnable: u8 {
        const RX_AVAILABLE = 1 << 0;
        const TX_EMPTY = 1 << 1;
        const LINE_STATUS = 1 << 2;
        const MODEM_STATUS = 1 << 3;
    }
}

bitflags! {
    /// Line Control Register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineControl: u8 {
        const WORD_LENGTH_8 = 0b11;
        const TWO_STOP_BITS = 1 << 2;
        const PARITY_ENABLE = 1 << 3;
        const DLAB = 1 << 7;
    }
}

bitflags! {
    /// FIFO Control Register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FifoControl: u8 {
        const ENABLE = 1 << 0;
        const CLEAR_RX = 1 << 1;
        const CLEAR_TX = 1 << 2;
        const TRIGGER_14 = 0b11 << 6;
    }
}

bitflags! {
    /// Line Status Register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        const DATA_READY = 1 << 0;
        const OVERRUN = 1 << 1;
        const PARITY_ERROR = 1 << 2;
        const FRAMING_ERROR = 1 << 3;
        const BREAK = 1 << 4;
        const THR_EMPTY = 1 << 5;
        const TX_IDLE = 1 << 6;
    }
}

bitflags! {
    /// Modem Status Register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModemStatus: u8 {
        const CTS = 1 << 4;
        const DSR = 1 << 5;
        const RI = 1 << 6;
        const DCD = 1 << 7;
    }
}

/// IIR bit 0: clear while an interrupt is pending
pub const IIR_NO_PENDING: u8 = 1 << 0;

/// IIR bits 1-2: interrupt identification
pub const IIR_ID_MASK: u8 = 0b110;

/// Source of a pending UART interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCause {
    ModemStatus,
    TransmitterEmpty,
    ReceivedData,
    LineStatus,
}

impl InterruptCause {
    /// Decode an IIR value; `None` when nothing is pending
    pub fn decode(iir: u8) -> Option<Self> {
        if iir & IIR_NO_PENDING != 0 {
            return None;
        }
        Some(match iir & IIR_ID_MASK {
            0b000 => InterruptCause::ModemStatus,
            0b010 => InterruptCause::TransmitterEmpty,
            0b100 => InterruptCause::ReceivedData,
            _ => InterruptCause::LineStatus,
        })
    }

    /// IIR encoding of this cause
    pub fn encode(self) -> u8 {
        match self {
            InterruptCause::ModemStatus => 0b000,
            InterruptCause::TransmitterEmpty => 0b010,
            InterruptCause::ReceivedData => 0b100,
            InterruptCause::LineStatus => 0b110,
        }
    }
}

/// Supported line rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B110 = 110,
    B150 = 150,
    B300 = 300,
    B600 = 600,
    B1200 = 1200,
    B2400 = 2400,
    B4800 = 4800,
    B9600 = 9600,
    B19200 = 19200,
}

impl BaudRate {
    pub const ALL: [BaudRate; 9] = [
        BaudRate::B110,
        BaudRate::B150,
        BaudRate::B300,
        BaudRate::B600,
        BaudRate::B1200,
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
    ];

    #[inline]
    pub fn bits_per_second(self) -> u32 {
        self as u32
    }

    /// Divisor latch value for this rate
    #[inline]
    pub fn divisor(self) -> u16 {
        (BASE_CLOCK / self.bits_per_second()) as u16
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = u32;

    fn try_from(rate: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|baud| baud.bits_per_second() == rate)
            .ok_or(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisors() {
        assert_eq!(BaudRate::B1200.divisor(), 96);
        assert_eq!(BaudRate::B19200.divisor(), 6);
        assert_eq!(BaudRate::B110.divisor(), 1047);
    }

    #[test]
    fn test_unsupported_rate_rejected() {
        assert_eq!(BaudRate::try_from(9600), Ok(BaudRate::B9600));
        assert_eq!(BaudRate::try_from(115_200), Err(115_200));
        assert_eq!(BaudRate::try_from(0), Err(0));
    }

    #[test]
    fn test_iir_decoding() {
        assert_eq!(InterruptCause::decode(0x01), None);
        assert_eq!(InterruptCause::decode(0x04), Some(InterruptCause::ReceivedData));
        assert_eq!(InterruptCause::decode(0xC2), Some(InterruptCause::TransmitterEmpty));
        assert_eq!(InterruptCause::decode(0x06), Some(InterruptCause::LineStatus));
        assert_eq!(InterruptCause::decode(0x00), Some(InterruptCause::ModemStatus));
    }

    #[test]
    fn test_open_sequence_constants() {
        let fcr = FifoControl::ENABLE | FifoControl::CLEAR_RX | FifoControl::CLEAR_TX | FifoControl::TRIGGER_14;
        assert_eq!(fcr.bits(), 0xC7);
        assert_eq!(LineControl::DLAB.bits(), 0x80);
        assert_eq!(LineControl::WORD_LENGTH_8.bits(), 0x03);
    }
}
