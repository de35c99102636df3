//! Serial port driver

use super::buffer::IoBuffer;
use super::dcb::{Dcb, DeviceStatus, Transfer};
use super::error::{CloseError, OpenError, ReadError, WriteError};
use super::event::EventFlag;
use super::hardware::Hardware;
use super::regs::{self, BaudRate, FifoControl, InterruptCause, InterruptEnable, LineControl};

/// Gate value installed at [`regs::SERIAL_VECTOR`] while the port is open
pub const HANDLER_GATE: usize = 0x5E71_A100;

/// Upper bound on back-to-back interrupts serviced by one
/// [`SerialPort::service_interrupts`] call
const MAX_INTERRUPTS_PER_POLL: usize = 4096;

#[inline]
fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Interrupt-driven 16550 serial port
///
/// Owns the platform handle and the device control block. All DCB state
/// touched by the interrupt handlers is modified from normal context only
/// while CPU interrupts are disabled.
pub struct SerialPort<H: Hardware> {
    hw: H,
    base: u16,
    dcb: Dcb,
    /// Gate that was installed before `open`, restored on `close`
    saved_gate: Option<usize>,
}

impl<H: Hardware> SerialPort<H> {
    /// Create a closed port at `base`
    pub fn new(hw: H, base: u16) -> Self {
        Self {
            hw,
            base,
            dcb: Dcb::new(),
            saved_gate: None,
        }
    }

    #[inline]
    fn reg(&self, offset: u16) -> u16 {
        self.base + offset
    }

    /// Open the port and enable receive interrupts.
    ///
    /// # Arguments
    /// * `event` - flag raised whenever a transfer completes
    /// * `baud` - line rate in bits per second
    pub fn open(&mut self, event: Option<EventFlag>, baud: u32) -> Result<(), OpenError> {
        let event = event.ok_or(OpenError::InvalidEventFlag)?;
        let baud = BaudRate::try_from(baud).map_err(OpenError::InvalidBaudRate)?;
        if self.dcb.open {
            return Err(OpenError::AlreadyOpen);
        }

        self.dcb.open = true;
        self.dcb.event = Some(event);
        self.dcb.status = DeviceStatus::Idle;
        self.dcb.ring.clear();

        self.saved_gate = Some(self.hw.gate(regs::SERIAL_VECTOR));
        self.hw.set_gate(regs::SERIAL_VECTOR, HANDLER_GATE);

        let divisor = baud.divisor();
        self.hw.outb(self.reg(regs::IER), 0);
        self.hw.outb(self.reg(regs::LCR), LineControl::DLAB.bits());
        self.hw.outb(self.reg(regs::DLM), (divisor >> 8) as u8);
        self.hw.outb(self.reg(regs::DLL), (divisor & 0xFF) as u8);
        self.hw.outb(self.reg(regs::LCR), LineControl::WORD_LENGTH_8.bits());
        self.hw.outb(
            self.reg(regs::FCR),
            (FifoControl::ENABLE | FifoControl::CLEAR_RX | FifoControl::CLEAR_TX | FifoControl::TRIGGER_14)
                .bits(),
        );

        self.hw.disable_interrupts();
        let mask = self.hw.inb(regs::PIC_MASK);
        self.hw.outb(regs::PIC_MASK, mask & !(1 << regs::SERIAL_IRQ_LEVEL));
        self.hw.enable_interrupts();

        self.hw.outb(self.reg(regs::IER), InterruptEnable::RX_AVAILABLE.bits());
        // Flush any stale receive data
        let _ = self.hw.inb(self.reg(regs::RBR));

        log::info!("[serial] port {:#x} open at {} baud (divisor {})", self.base, baud.bits_per_second(), divisor);
        Ok(())
    }

    /// Close the port, mask its interrupt and restore the original gate.
    pub fn close(&mut self) -> Result<(), CloseError> {
        if !self.dcb.open {
            return Err(CloseError::NotOpen);
        }

        self.dcb.open = false;

        self.hw.disable_interrupts();
        let mask = self.hw.inb(regs::PIC_MASK);
        self.hw.outb(regs::PIC_MASK, mask | (1 << regs::SERIAL_IRQ_LEVEL));
        self.hw.enable_interrupts();

        self.hw.outb(self.reg(regs::MSR), 0);
        self.hw.outb(self.reg(regs::IER), 0);

        if let Some(gate) = self.saved_gate.take() {
            self.hw.set_gate(regs::SERIAL_VECTOR, gate);
        }

        log::info!("[serial] port {:#x} closed", self.base);
        Ok(())
    }

    /// Start a read of `buffer.count()` bytes.
    ///
    /// Bytes already sitting in the ring buffer are consumed first. If that
    /// satisfies the request (count reached or a line terminator consumed)
    /// the read completes before returning; otherwise the port stays in
    /// [`DeviceStatus::Reading`] and the input handler finishes the job.
    /// Terminators end a read but are never stored or counted.
    pub fn read(&mut self, buffer: &IoBuffer) -> Result<(), ReadError> {
        if !self.dcb.open {
            return Err(ReadError::NotOpen);
        }
        let capacity = buffer.capacity();
        if capacity == 0 {
            return Err(ReadError::InvalidBuffer);
        }
        let count = buffer.count();
        if count == 0 || count > capacity {
            return Err(ReadError::InvalidCount(count));
        }
        if self.dcb.status != DeviceStatus::Idle {
            log::warn!("[serial] read rejected: device {:?}", self.dcb.status);
            return Err(ReadError::Busy);
        }

        self.hw.disable_interrupts();
        self.dcb.clear_event();
        self.dcb.status = DeviceStatus::Reading;
        self.dcb.input = Transfer::begin(buffer, count);

        let mut terminated = false;
        while !self.dcb.input.is_satisfied() {
            let Some(byte) = self.dcb.ring.take() else {
                break;
            };
            if is_terminator(byte) {
                terminated = true;
                break;
            }
            buffer.store(self.dcb.input.done, byte);
            self.dcb.input.done += 1;
        }
        if terminated || self.dcb.input.is_satisfied() {
            self.dcb.complete_read();
            log::debug!("[serial] read satisfied from ring buffer ({} bytes)", buffer.count());
        }
        self.hw.enable_interrupts();

        Ok(())
    }

    /// Start a write of `buffer.count()` bytes.
    ///
    /// The first byte goes out immediately; the rest are sent one per
    /// transmitter-empty interrupt. Completion is always signalled from the
    /// output handler.
    pub fn write(&mut self, buffer: &IoBuffer) -> Result<(), WriteError> {
        if !self.dcb.open {
            return Err(WriteError::NotOpen);
        }
        let capacity = buffer.capacity();
        if capacity == 0 {
            return Err(WriteError::InvalidBuffer);
        }
        let count = buffer.count();
        if count == 0 || count > capacity {
            return Err(WriteError::InvalidCount(count));
        }
        if self.dcb.status != DeviceStatus::Idle {
            log::warn!("[serial] write rejected: device {:?}", self.dcb.status);
            return Err(WriteError::Busy);
        }

        self.hw.disable_interrupts();
        self.dcb.clear_event();
        self.dcb.status = DeviceStatus::Writing;
        self.dcb.output = Transfer::begin(buffer, count);

        let first = buffer.byte(0).unwrap_or(0);
        self.hw.outb(self.reg(regs::THR), first);
        self.dcb.output.done = 1;

        let ier = self.hw.inb(self.reg(regs::IER));
        self.hw.outb(self.reg(regs::IER), ier | InterruptEnable::TX_EMPTY.bits());
        self.hw.enable_interrupts();

        Ok(())
    }

    /// First-level interrupt handler for the serial vector.
    ///
    /// Returns the cause that was serviced, if any.
    pub fn handle_interrupt(&mut self) -> Option<InterruptCause> {
        let mut serviced = None;

        if self.dcb.open {
            let iir = self.hw.inb(self.reg(regs::IIR));
            serviced = InterruptCause::decode(iir);
            match serviced {
                Some(InterruptCause::ModemStatus) => {
                    let _ = self.hw.inb(self.reg(regs::MSR));
                }
                Some(InterruptCause::TransmitterEmpty) => self.output_interrupt(),
                Some(InterruptCause::ReceivedData) => self.input_interrupt(),
                Some(InterruptCause::LineStatus) => {
                    let _ = self.hw.inb(self.reg(regs::LSR));
                }
                None => {}
            }
        }

        self.hw.outb(regs::PIC_COMMAND, regs::EOI);
        serviced
    }

    /// Second-level handler for received data
    fn input_interrupt(&mut self) {
        let byte = self.hw.inb(self.reg(regs::RBR));

        if self.dcb.status != DeviceStatus::Reading {
            if !self.dcb.ring.store(byte) {
                log::warn!("[serial] ring buffer full, dropped {:#04x}", byte);
            }
            return;
        }

        if is_terminator(byte) {
            self.dcb.complete_read();
            return;
        }

        if let Some(buffer) = &self.dcb.input.buffer {
            buffer.store(self.dcb.input.done, byte);
        }
        self.dcb.input.done += 1;
        if self.dcb.input.is_satisfied() {
            self.dcb.complete_read();
        }
    }

    /// Second-level handler for transmitter-empty
    fn output_interrupt(&mut self) {
        if self.dcb.status != DeviceStatus::Writing {
            return;
        }

        if !self.dcb.output.is_satisfied() {
            let next = self
                .dcb
                .output
                .buffer
                .as_ref()
                .and_then(|buffer| buffer.byte(self.dcb.output.done))
                .unwrap_or(0);
            self.hw.outb(self.reg(regs::THR), next);
            self.dcb.output.done += 1;
            return;
        }

        self.dcb.complete_write();
        let ier = self.hw.inb(self.reg(regs::IER));
        self.hw.outb(self.reg(regs::IER), ier & !InterruptEnable::TX_EMPTY.bits());
    }

    /// Run the interrupt handler for as long as the device asserts its line.
    ///
    /// Stands in for the CPU taking the serial vector; returns the number of
    /// interrupts serviced.
    pub fn service_interrupts(&mut self) -> usize {
        let mut serviced = 0;
        while self.hw.irq_line() && serviced < MAX_INTERRUPTS_PER_POLL {
            self.handle_interrupt();
            serviced += 1;
        }
        serviced
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.dcb.open
    }

    #[inline]
    pub fn status(&self) -> DeviceStatus {
        self.dcb.status
    }

    #[inline]
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Bytes waiting in the receive ring buffer
    #[inline]
    pub fn buffered(&self) -> usize {
        self.dcb.ring.len()
    }

    /// Bytes dropped because the ring buffer was full
    #[inline]
    pub fn dropped(&self) -> usize {
        self.dcb.ring.dropped()
    }

    pub fn event(&self) -> Option<&EventFlag> {
        self.dcb.event.as_ref()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

impl<H: Hardware> core::fmt::Debug for SerialPort<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialPort")
            .field("base", &format_args!("{:#x}", self.base))
            .field("open", &self.dcb.open)
            .field("status", &self.dcb.status)
            .field("buffered", &self.dcb.ring.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::{InterruptTable, LoopbackUart, PortIo, RING_CAPACITY};

    fn open_port() -> (SerialPort<LoopbackUart>, EventFlag) {
        let flag = EventFlag::new();
        let mut port = SerialPort::new(LoopbackUart::new(regs::COM1), regs::COM1);
        port.open(Some(flag.clone()), 1200).unwrap();
        (port, flag)
    }

    #[test]
    fn test_open_programs_device() {
        let (port, _) = open_port();
        let hw = port.hardware();

        assert_eq!(hw.divisor(), 96);
        assert_eq!(hw.line_control(), 0x03);
        assert_eq!(hw.fifo_control(), 0xC7);
        assert_eq!(hw.interrupt_enable(), 0x01);
        assert_eq!(hw.pic_mask() & (1 << regs::SERIAL_IRQ_LEVEL), 0);
        assert_eq!(hw.gate(regs::SERIAL_VECTOR), HANDLER_GATE);
    }

    #[test]
    fn test_open_errors() {
        let mut port = SerialPort::new(LoopbackUart::new(regs::COM1), regs::COM1);

        let err = port.open(None, 1200).unwrap_err();
        assert_eq!(err.code(), -101);

        let err = port.open(Some(EventFlag::new()), 1234).unwrap_err();
        assert_eq!(err, OpenError::InvalidBaudRate(1234));
        assert_eq!(err.code(), -102);

        port.open(Some(EventFlag::new()), 9600).unwrap();
        assert_eq!(port.open(Some(EventFlag::new()), 9600), Err(OpenError::AlreadyOpen));
    }

    #[test]
    fn test_close_restores_gate() {
        let mut port = SerialPort::new(LoopbackUart::new(regs::COM1), regs::COM1);
        port.hardware_mut().set_gate(regs::SERIAL_VECTOR, 0xABCD);

        assert_eq!(port.close(), Err(CloseError::NotOpen));
        assert_eq!(CloseError::NotOpen.code(), -201);

        port.open(Some(EventFlag::new()), 2400).unwrap();
        port.close().unwrap();

        let hw = port.hardware();
        assert_eq!(hw.gate(regs::SERIAL_VECTOR), 0xABCD);
        assert_ne!(hw.pic_mask() & (1 << regs::SERIAL_IRQ_LEVEL), 0);
        assert_eq!(hw.interrupt_enable(), 0);
        assert!(!port.is_open());
    }

    #[test]
    fn test_read_write_validation() {
        let mut port = SerialPort::new(LoopbackUart::new(regs::COM1), regs::COM1);
        let buffer = IoBuffer::for_read(4);
        assert_eq!(port.read(&buffer).unwrap_err().code(), -301);
        assert_eq!(port.write(&buffer).unwrap_err().code(), -401);

        port.open(Some(EventFlag::new()), 1200).unwrap();

        let empty = IoBuffer::from_parts(Vec::new(), 1);
        assert_eq!(port.read(&empty).unwrap_err().code(), -302);
        assert_eq!(port.write(&empty).unwrap_err().code(), -402);

        let overlong = IoBuffer::from_parts(vec![0; 2], 3);
        assert_eq!(port.read(&overlong), Err(ReadError::InvalidCount(3)));
        assert_eq!(port.write(&overlong), Err(WriteError::InvalidCount(3)));

        let zero = IoBuffer::from_parts(vec![0; 2], 0);
        assert_eq!(port.read(&zero).unwrap_err().code(), -303);
        assert_eq!(port.write(&zero).unwrap_err().code(), -403);
    }

    #[test]
    fn test_busy_while_writing() {
        let (mut port, flag) = open_port();
        port.write(&IoBuffer::for_write(b"abc")).unwrap();
        assert_eq!(port.status(), DeviceStatus::Writing);

        assert_eq!(port.write(&IoBuffer::for_write(b"x")).unwrap_err().code(), -404);
        assert_eq!(port.read(&IoBuffer::for_read(1)).unwrap_err().code(), -304);
        assert!(!flag.is_set());
    }

    #[test]
    fn test_write_completes_from_interrupts() {
        let (mut port, flag) = open_port();
        let buffer = IoBuffer::for_write(b"ping");
        port.write(&buffer).unwrap();

        // First byte is on the wire before any interrupt
        assert_eq!(port.hardware().transmitted(), b"p");
        assert!(!flag.is_set());

        port.service_interrupts();
        assert!(flag.is_set());
        assert_eq!(flag.times_raised(), 1);
        assert_eq!(port.status(), DeviceStatus::Idle);
        assert_eq!(buffer.count(), 4);
        assert_eq!(port.hardware().transmitted(), b"ping");
        assert_eq!(port.hardware().interrupt_enable() & InterruptEnable::TX_EMPTY.bits(), 0);
    }

    #[test]
    fn test_loopback_write_then_read() {
        let (mut port, flag) = open_port();
        port.write(&IoBuffer::for_write(b"hello")).unwrap();
        port.service_interrupts();
        assert_eq!(port.buffered(), 5);

        let buffer = IoBuffer::for_read(5);
        port.read(&buffer).unwrap();

        // Satisfied straight from the ring buffer
        assert_eq!(port.status(), DeviceStatus::Idle);
        assert_eq!(buffer.contents(), b"hello");
        assert_eq!(flag.times_raised(), 2);
    }

    #[test]
    fn test_read_completes_on_terminator() {
        let (mut port, flag) = open_port();
        let buffer = IoBuffer::for_read(16);
        port.read(&buffer).unwrap();
        assert_eq!(port.status(), DeviceStatus::Reading);

        port.hardware_mut().inject(b"ls\rmore");
        port.service_interrupts();

        assert!(flag.is_set());
        assert_eq!(buffer.contents(), b"ls");
        // Bytes after the terminator land in the ring buffer
        assert_eq!(port.buffered(), 4);
    }

    #[test]
    fn test_read_resumes_after_ring_drain() {
        let (mut port, flag) = open_port();
        port.hardware_mut().inject(b"ab");
        port.service_interrupts();
        // Arrives while the read is being set up
        port.hardware_mut().inject(b"cd");

        let buffer = IoBuffer::for_read(4);
        port.read(&buffer).unwrap();
        assert_eq!(port.status(), DeviceStatus::Reading);
        assert!(port.hardware().cpu_interrupts_enabled());
        assert_eq!(port.buffered(), 0);
        assert!(!flag.is_set());

        port.service_interrupts();
        assert_eq!(buffer.contents(), b"abcd");
        assert_eq!(flag.times_raised(), 1);
        assert_eq!(port.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_ring_terminator_ends_read() {
        let (mut port, _) = open_port();
        port.hardware_mut().inject(b"ok\nrest");
        port.service_interrupts();

        let buffer = IoBuffer::for_read(10);
        port.read(&buffer).unwrap();
        assert_eq!(buffer.contents(), b"ok");
        assert_eq!(port.buffered(), 4);
    }

    #[test]
    fn test_ring_overflow_drops_bytes() {
        let (mut port, _) = open_port();
        let burst = vec![b'x'; RING_CAPACITY + 25];
        port.hardware_mut().inject(&burst);
        port.service_interrupts();

        assert_eq!(port.buffered(), RING_CAPACITY);
        assert_eq!(port.dropped(), 25);
    }

    #[test]
    fn test_interrupt_ignored_when_closed() {
        let mut port = SerialPort::new(LoopbackUart::new(regs::COM1), regs::COM1);
        assert_eq!(port.handle_interrupt(), None);
        assert_eq!(port.hardware().eoi_count(), 1);
    }

    #[test]
    fn test_line_and_modem_status_are_acknowledged() {
        let (mut port, _) = open_port();
        let enable = InterruptEnable::RX_AVAILABLE | InterruptEnable::LINE_STATUS | InterruptEnable::MODEM_STATUS;
        port.hardware_mut().outb(regs::COM1 + regs::IER, enable.bits());

        port.hardware_mut().raise_line_status();
        assert_eq!(port.handle_interrupt(), Some(InterruptCause::LineStatus));

        port.hardware_mut().raise_modem_status();
        assert_eq!(port.handle_interrupt(), Some(InterruptCause::ModemStatus));
        assert!(!port.hardware().irq_line());
    }
}
