//! Register-level 16550 model with transmit looped back to receive
//!
//! Models just enough of a PC serial port for the driver to run unchanged:
//!
//! - DLAB routing of offsets 0/1 to the divisor latch
//! - IIR priority: line status, received data, transmitter empty, modem
//! - reading IIR acknowledges a transmitter-empty cause
//! - the master PIC mask and the CPU interrupt flag gate the IRQ line
//!
//! Bytes written to THR are logged and appended to the receive FIFO;
//! [`LoopbackUart::inject`] feeds bytes from "the other end".

use std::collections::VecDeque;

use super::hardware::{Hardware, InterruptTable, PortIo};
use super::regs::{self, FifoControl, InterruptCause, InterruptEnable, LineControl, LineStatus, ModemStatus};

const VECTORS: usize = 256;

/// Loopback serial device plus the slice of PIC/CPU state it needs
pub struct LoopbackUart {
    base: u16,
    loopback: bool,

    ier: u8,
    lcr: u8,
    mcr: u8,
    fcr: u8,
    scr: u8,
    msr: u8,
    divisor: u16,

    rx: VecDeque<u8>,
    transmitted: Vec<u8>,
    thr_empty_pending: bool,
    line_status_pending: bool,
    modem_status_pending: bool,

    pic_mask: u8,
    eoi_count: usize,
    cpu_interrupts: bool,
    gates: Vec<usize>,
}

impl LoopbackUart {
    /// Device at `base` whose transmitter feeds its own receiver
    pub fn new(base: u16) -> Self {
        Self {
            base,
            loopback: true,
            ier: 0,
            lcr: 0,
            mcr: 0,
            fcr: 0,
            scr: 0,
            msr: (ModemStatus::CTS | ModemStatus::DSR | ModemStatus::DCD).bits(),
            divisor: 0,
            rx: VecDeque::new(),
            transmitted: Vec::new(),
            thr_empty_pending: false,
            line_status_pending: false,
            modem_status_pending: false,
            pic_mask: 0xFF,
            eoi_count: 0,
            cpu_interrupts: true,
            gates: vec![0; VECTORS],
        }
    }

    /// Device at `base` whose transmitted bytes are only logged
    pub fn detached(base: u16) -> Self {
        Self {
            loopback: false,
            ..Self::new(base)
        }
    }

    /// Bytes arriving on the line
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Every byte written to THR so far
    pub fn transmitted(&self) -> &[u8] {
        &self.transmitted
    }

    pub fn divisor(&self) -> u16 {
        self.divisor
    }

    pub fn line_control(&self) -> u8 {
        self.lcr
    }

    pub fn fifo_control(&self) -> u8 {
        self.fcr
    }

    pub fn interrupt_enable(&self) -> u8 {
        self.ier
    }

    pub fn modem_control(&self) -> u8 {
        self.mcr
    }

    pub fn pic_mask(&self) -> u8 {
        self.pic_mask
    }

    pub fn eoi_count(&self) -> usize {
        self.eoi_count
    }

    pub fn cpu_interrupts_enabled(&self) -> bool {
        self.cpu_interrupts
    }

    /// Bytes sitting in the receive FIFO
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    /// Simulate a line error
    pub fn raise_line_status(&mut self) {
        self.line_status_pending = true;
    }

    /// Simulate a modem line change
    pub fn raise_modem_status(&mut self) {
        self.modem_status_pending = true;
    }

    #[inline]
    fn dlab(&self) -> bool {
        self.lcr & LineControl::DLAB.bits() != 0
    }

    #[inline]
    fn enabled(&self, bit: InterruptEnable) -> bool {
        InterruptEnable::from_bits_truncate(self.ier).contains(bit)
    }

    /// Highest-priority cause the UART is currently asserting
    fn pending_cause(&self) -> Option<InterruptCause> {
        if self.line_status_pending && self.enabled(InterruptEnable::LINE_STATUS) {
            Some(InterruptCause::LineStatus)
        } else if !self.rx.is_empty() && self.enabled(InterruptEnable::RX_AVAILABLE) {
            Some(InterruptCause::ReceivedData)
        } else if self.thr_empty_pending && self.enabled(InterruptEnable::TX_EMPTY) {
            Some(InterruptCause::TransmitterEmpty)
        } else if self.modem_status_pending && self.enabled(InterruptEnable::MODEM_STATUS) {
            Some(InterruptCause::ModemStatus)
        } else {
            None
        }
    }

    fn read_register(&mut self, offset: u16) -> u8 {
        match offset {
            0 if self.dlab() => (self.divisor & 0xFF) as u8,
            0 => self.rx.pop_front().unwrap_or(0),
            1 if self.dlab() => (self.divisor >> 8) as u8,
            1 => self.ier,
            2 => match self.pending_cause() {
                Some(cause) => {
                    if cause == InterruptCause::TransmitterEmpty {
                        self.thr_empty_pending = false;
                    }
                    cause.encode() | 0xC0
                }
                None => regs::IIR_NO_PENDING | 0xC0,
            },
            3 => self.lcr,
            4 => self.mcr,
            5 => {
                self.line_status_pending = false;
                let mut lsr = LineStatus::THR_EMPTY | LineStatus::TX_IDLE;
                if !self.rx.is_empty() {
                    lsr |= LineStatus::DATA_READY;
                }
                lsr.bits()
            }
            6 => {
                self.modem_status_pending = false;
                self.msr
            }
            _ => self.scr,
        }
    }

    fn write_register(&mut self, offset: u16, value: u8) {
        match offset {
            0 if self.dlab() => self.divisor = (self.divisor & 0xFF00) | value as u16,
            0 => {
                self.transmitted.push(value);
                if self.loopback {
                    self.rx.push_back(value);
                }
                self.thr_empty_pending = true;
            }
            1 if self.dlab() => self.divisor = (self.divisor & 0x00FF) | ((value as u16) << 8),
            1 => {
                let was_enabled = self.enabled(InterruptEnable::TX_EMPTY);
                self.ier = value & 0x0F;
                // Enabling THRE with an empty holding register raises it at once
                if !was_enabled && self.enabled(InterruptEnable::TX_EMPTY) {
                    self.thr_empty_pending = true;
                }
            }
            2 => {
                self.fcr = value;
                if FifoControl::from_bits_truncate(value).contains(FifoControl::CLEAR_RX) {
                    self.rx.clear();
                }
            }
            3 => self.lcr = value,
            4 => self.mcr = value,
            5 => {}
            6 => self.msr = value,
            _ => self.scr = value,
        }
    }
}

impl PortIo for LoopbackUart {
    fn inb(&mut self, port: u16) -> u8 {
        match port {
            regs::PIC_MASK => self.pic_mask,
            p if (self.base..self.base + regs::REGISTER_SPAN).contains(&p) => self.read_register(p - self.base),
            _ => 0xFF,
        }
    }

    fn outb(&mut self, port: u16, value: u8) {
        match port {
            regs::PIC_MASK => self.pic_mask = value,
            regs::PIC_COMMAND => {
                if value == regs::EOI {
                    self.eoi_count += 1;
                }
            }
            p if (self.base..self.base + regs::REGISTER_SPAN).contains(&p) => {
                self.write_register(p - self.base, value)
            }
            _ => log::trace!("[loopback] write to unmapped port {:#x}", port),
        }
    }
}

impl InterruptTable for LoopbackUart {
    fn gate(&self, vector: u8) -> usize {
        self.gates[vector as usize]
    }

    fn set_gate(&mut self, vector: u8, handler: usize) {
        self.gates[vector as usize] = handler;
    }
}

impl Hardware for LoopbackUart {
    fn disable_interrupts(&mut self) {
        self.cpu_interrupts = false;
    }

    fn enable_interrupts(&mut self) {
        self.cpu_interrupts = true;
    }

    fn irq_line(&self) -> bool {
        let unmasked = self.pic_mask & (1 << regs::SERIAL_IRQ_LEVEL) == 0;
        self.cpu_interrupts && unmasked && self.pending_cause().is_some()
    }
}

impl core::fmt::Debug for LoopbackUart {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoopbackUart")
            .field("base", &format_args!("{:#x}", self.base))
            .field("loopback", &self.loopback)
            .field("ier", &self.ier)
            .field("rx", &self.rx.len())
            .field("transmitted", &self.transmitted.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u16 = regs::COM1;

    #[test]
    fn test_dlab_routes_divisor_latch() {
        let mut uart = LoopbackUart::new(BASE);
        uart.outb(BASE + regs::LCR, LineControl::DLAB.bits());
        uart.outb(BASE + regs::DLL, 0x60);
        uart.outb(BASE + regs::DLM, 0x00);
        uart.outb(BASE + regs::LCR, 0x03);

        assert_eq!(uart.divisor(), 0x60);
        assert!(uart.transmitted().is_empty());
        assert_eq!(uart.interrupt_enable(), 0);
    }

    #[test]
    fn test_transmit_loops_back() {
        let mut uart = LoopbackUart::new(BASE);
        uart.outb(BASE + regs::THR, b'Q');
        assert_eq!(uart.transmitted(), b"Q");
        assert_eq!(uart.inb(BASE + regs::RBR), b'Q');

        let mut detached = LoopbackUart::detached(BASE);
        detached.outb(BASE + regs::THR, b'Q');
        assert_eq!(detached.pending_rx(), 0);
    }

    #[test]
    fn test_irq_line_gated_by_pic_and_cpu() {
        let mut uart = LoopbackUart::new(BASE);
        uart.outb(BASE + regs::IER, InterruptEnable::RX_AVAILABLE.bits());
        uart.inject(b"a");
        assert!(!uart.irq_line(), "PIC masks the line by default");

        uart.outb(regs::PIC_MASK, 0xFF & !(1 << regs::SERIAL_IRQ_LEVEL));
        assert!(uart.irq_line());

        uart.disable_interrupts();
        assert!(!uart.irq_line());
    }

    #[test]
    fn test_reading_iir_acknowledges_thre() {
        let mut uart = LoopbackUart::detached(BASE);
        uart.outb(BASE + regs::IER, InterruptEnable::TX_EMPTY.bits());

        assert_eq!(InterruptCause::decode(uart.inb(BASE + regs::IIR)), Some(InterruptCause::TransmitterEmpty));
        assert_eq!(InterruptCause::decode(uart.inb(BASE + regs::IIR)), None);
    }
}
