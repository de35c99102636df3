//! Hardware access traits
//!
//! The driver reaches the outside world only through these traits. On a
//! PC-compatible machine they map to `in`/`out` instructions, `cli`/`sti`
//! and the interrupt vector table; in tests they are backed by
//! [`LoopbackUart`](super::LoopbackUart).

/// Byte-wide port I/O
///
/// Reads take `&mut self`: reading RBR or IIR has side effects on the device.
pub trait PortIo {
    fn inb(&mut self, port: u16) -> u8;
    fn outb(&mut self, port: u16, value: u8);
}

/// Interrupt vector table access
pub trait InterruptTable {
    /// Current handler installed at `vector`
    fn gate(&self, vector: u8) -> usize;

    /// Install `handler` at `vector`
    fn set_gate(&mut self, vector: u8, handler: usize);
}

/// Everything the serial driver needs from the platform
pub trait Hardware: PortIo + InterruptTable {
    /// Stop interrupt delivery to the CPU
    fn disable_interrupts(&mut self);

    /// Resume interrupt delivery to the CPU
    fn enable_interrupts(&mut self);

    /// Level of the device's interrupt request line as seen by the CPU
    /// (masked by the PIC and the CPU interrupt flag)
    fn irq_line(&self) -> bool;
}
