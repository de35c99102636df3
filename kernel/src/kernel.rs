//! Kernel context
//!
//! [`Kernel`] is the single owner of everything the kernel keeps across
//! traps: the memory capability, the process registry, the serial port and
//! its I/O scheduler, the request slot and the dispatcher state. Nothing is
//! global; every operation goes through a `&mut Kernel`.
//!
//! ## Boot sequence
//!
//! 1. Bring up memory (heap or bump region) from the configuration
//! 2. Open the serial port with the shared event flag
//! 3. Reserve the device record
//! 4. Load the configured processes suspended, then resume them all
//!
//! The first [`Kernel::dispatch`] records the caller's context as the boot
//! context and starts the highest-priority process.

use ember_allocator::{BumpMemory, Heap, HeapError, MemoryCapability};
use ember_drivers::{EventFlag, Hardware, IoBuffer, SerialPort};

use crate::config::{KernelConfig, MemoryMode};
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::{Fatal, KernelError, Result};
use crate::io::IoScheduler;
use crate::objects::{ProcessClass, ProcessId};
use crate::scheduler::{ProcessInfo, ProcessRegistry, QueueKind, RegistryError};
use crate::syscall::{DeviceId, Request, RequestSlot, SyscallError, DEFAULT_DEVICE};

/// Bytes reserved for the serial device's control record
pub const DEVICE_RECORD_BYTES: usize = 256;

/// The memory capability selected at boot
#[derive(Debug)]
pub enum KernelMemory {
    Heap(Heap),
    Bump(BumpMemory),
}

impl KernelMemory {
    pub fn from_config(config: &KernelConfig) -> Result<Self> {
        Ok(match config.memory {
            MemoryMode::Heap => KernelMemory::Heap(Heap::new(config.heap_size)?),
            MemoryMode::Bump => KernelMemory::Bump(BumpMemory::new(config.heap_size)),
        })
    }

    /// The heap, when running with one
    pub fn heap(&self) -> Option<&Heap> {
        match self {
            KernelMemory::Heap(heap) => Some(heap),
            KernelMemory::Bump(_) => None,
        }
    }
}

impl MemoryCapability for KernelMemory {
    fn allocate(&mut self, bytes: usize) -> core::result::Result<usize, HeapError> {
        match self {
            KernelMemory::Heap(heap) => heap.allocate(bytes),
            KernelMemory::Bump(bump) => bump.allocate(bytes),
        }
    }

    fn free(&mut self, address: usize) -> core::result::Result<(), HeapError> {
        match self {
            KernelMemory::Heap(heap) => heap.free(address),
            KernelMemory::Bump(bump) => bump.free(address),
        }
    }
}

/// Kernel state for one CPU
pub struct Kernel<H: Hardware> {
    pub(crate) config: KernelConfig,
    pub(crate) memory: KernelMemory,
    pub(crate) registry: ProcessRegistry,
    pub(crate) io: IoScheduler,
    pub(crate) serial: SerialPort<H>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) requests: RequestSlot,
    device_record: Option<usize>,
    pub(crate) shutdown: bool,
}

impl<H: Hardware> Kernel<H> {
    /// Bring the kernel up on `hw`.
    pub fn boot(config: KernelConfig, hw: H) -> Result<Self> {
        let mut memory = KernelMemory::from_config(&config)?;
        if memory.heap().is_some_and(|heap| !heap.is_empty()) {
            return Err(KernelError::HeapNotEmpty("at boot"));
        }

        // Raised until the first transfer starts
        let event = EventFlag::new();
        event.set();

        let mut serial = SerialPort::new(hw, config.serial.base);
        serial.open(Some(event.clone()), config.serial.baud_rate)?;
        let device_record = memory.allocate(DEVICE_RECORD_BYTES)?;

        let mut registry = ProcessRegistry::new();
        for process in &config.processes {
            registry.load(&mut memory, &process.name, process.class, process.priority, process.entry)?;
        }
        let resumed = registry.resume_all();

        log::info!(
            "[kernel] boot complete: {} processes, {:?} memory of {} bytes",
            resumed,
            config.memory,
            config.heap_size
        );

        Ok(Self {
            io: IoScheduler::new(DEFAULT_DEVICE, event),
            config,
            memory,
            registry,
            serial,
            dispatcher: Dispatcher::new(),
            requests: RequestSlot::new(),
            device_record: Some(device_record),
            shutdown: false,
        })
    }

    // ------------------------------------------------------------------
    // Process side
    // ------------------------------------------------------------------

    /// Validate a request and leave it for the next trap.
    ///
    /// # Arguments
    /// * `op_code` - one of the [`crate::syscall::numbers`] codes
    /// * `device` - target of a READ or WRITE
    /// * `buffer` - transfer buffer; its count is the requested byte count
    pub fn sys_req(
        &mut self,
        op_code: u32,
        device: DeviceId,
        buffer: Option<IoBuffer>,
    ) -> core::result::Result<(), SyscallError> {
        let request = Request {
            op_code,
            device,
            buffer,
        };
        request.validate()?;
        self.requests.post(request);
        Ok(())
    }

    /// Post a request without validating it, as a raw trap stub would.
    pub fn post_request(&mut self, request: Request) {
        self.requests.post(request);
    }

    /// `sys_req` followed by the trap it leads to.
    pub fn syscall(
        &mut self,
        op_code: u32,
        device: DeviceId,
        buffer: Option<IoBuffer>,
        saved: Context,
    ) -> Result<Context> {
        self.sys_req(op_code, device, buffer)?;
        Ok(self.dispatch(saved)?)
    }

    /// Deliver pending serial interrupts, returning how many were taken.
    pub fn service_interrupts(&mut self) -> usize {
        self.serial.service_interrupts()
    }

    // ------------------------------------------------------------------
    // Registry operations
    // ------------------------------------------------------------------

    pub fn create(
        &mut self,
        name: &str,
        class: ProcessClass,
        priority: u8,
    ) -> core::result::Result<ProcessId, RegistryError> {
        self.registry.create(&mut self.memory, name, class, priority)
    }

    /// Create a process suspended, starting at `entry` once resumed.
    pub fn load(
        &mut self,
        name: &str,
        class: ProcessClass,
        priority: u8,
        entry: u32,
    ) -> core::result::Result<ProcessId, RegistryError> {
        self.registry.load(&mut self.memory, name, class, priority, entry)
    }

    /// Destroy a queued process along with its queued I/O.
    pub fn delete(&mut self, name: &str) -> core::result::Result<ProcessId, RegistryError> {
        let id = self.registry.delete(&mut self.memory, name)?;
        self.io.cancel(&mut self.memory, id);
        Ok(id)
    }

    pub fn block(&mut self, name: &str) -> core::result::Result<bool, RegistryError> {
        self.registry.block(name)
    }

    pub fn unblock(&mut self, name: &str) -> core::result::Result<bool, RegistryError> {
        self.registry.unblock(name)
    }

    pub fn suspend(&mut self, name: &str) -> bool {
        self.registry.suspend(name)
    }

    pub fn resume(&mut self, name: &str) -> bool {
        self.registry.resume(name)
    }

    pub fn resume_all(&mut self) -> usize {
        self.registry.resume_all()
    }

    pub fn set_priority(&mut self, name: &str, priority: u8) -> core::result::Result<(), RegistryError> {
        self.registry.set_priority(name, priority)
    }

    pub fn find(&self, name: &str) -> Option<QueueKind> {
        self.registry.find(name)
    }

    pub fn show(&self, name: &str) -> Option<ProcessInfo> {
        self.registry.show(name)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Handle of the process the last dispatch resumed
    pub fn running(&self) -> Option<ProcessId> {
        self.dispatcher.running()
    }

    pub fn running_name(&self) -> Option<&str> {
        self.running()
            .and_then(|id| self.registry.get(id))
            .map(|pcb| pcb.name())
    }

    /// Fatal condition that halted the kernel, if any
    pub fn halted(&self) -> Option<&Fatal> {
        self.dispatcher.halted()
    }

    /// Context switches performed so far
    pub fn switches(&self) -> u64 {
        self.dispatcher.switches()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn memory(&self) -> &KernelMemory {
        &self.memory
    }

    pub fn heap(&self) -> Option<&Heap> {
        self.memory.heap()
    }

    pub fn io(&self) -> &IoScheduler {
        &self.io
    }

    pub fn serial(&self) -> &SerialPort<H> {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut SerialPort<H> {
        &mut self.serial
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Make the next dispatch return to the boot context.
    pub fn request_shutdown(&mut self) {
        log::info!("[kernel] shutdown requested");
        self.shutdown = true;
    }

    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    /// Close the port and release every record.
    ///
    /// With a heap, fails if anything is still allocated afterwards.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.serial.is_open() {
            self.serial.close()?;
        }

        for id in self.registry.ids() {
            self.io.cancel(&mut self.memory, id);
            self.registry.destroy(&mut self.memory, id)?;
        }
        self.dispatcher.clear_running();

        if let Some(record) = self.device_record.take() {
            if let Err(err) = self.memory.free(record) {
                log::warn!("[kernel] device record not returned: {}", err);
            }
        }

        if self.heap().is_some_and(|heap| !heap.is_empty()) {
            log::error!("[kernel] heap still holds blocks after shutdown");
            return Err(KernelError::HeapNotEmpty("after shutdown"));
        }
        log::info!("[kernel] shutdown complete");
        Ok(())
    }
}

impl<H: Hardware> core::fmt::Debug for Kernel<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel")
            .field("running", &self.running())
            .field("registry", &self.registry)
            .field("io", &self.io)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::numbers::SYS_WRITE;
    use ember_drivers::serial::COM1;
    use ember_drivers::LoopbackUart;

    fn boot(config: KernelConfig) -> Kernel<LoopbackUart> {
        Kernel::boot(config, LoopbackUart::new(COM1)).unwrap()
    }

    #[test]
    fn test_default_boot() {
        let kernel = boot(KernelConfig::default());

        assert_eq!(kernel.find("idle"), Some(QueueKind::Ready));
        assert_eq!(kernel.find("secondaryidle"), Some(QueueKind::Ready));
        assert!(kernel.serial().is_open());
        assert!(kernel.io().event().is_set());
        // Two process records plus the device record
        assert_eq!(kernel.heap().unwrap().show_allocated().len(), 3);
        assert_eq!(kernel.serial().hardware().divisor(), 96);
    }

    #[test]
    fn test_boot_rejects_bad_baud() {
        let mut config = KernelConfig::default();
        config.serial.baud_rate = 1234;
        let err = Kernel::boot(config, LoopbackUart::new(COM1)).unwrap_err();
        assert!(matches!(err, KernelError::Open(_)));
    }

    #[test]
    fn test_boot_with_tiny_heap_fails() {
        let config = KernelConfig {
            heap_size: 600,
            ..KernelConfig::default()
        };
        let err = Kernel::boot(config, LoopbackUart::new(COM1)).unwrap_err();
        assert!(matches!(err, KernelError::Registry(RegistryError::OutOfMemory(_))));
    }

    #[test]
    fn test_bump_memory_boot() {
        let config = KernelConfig {
            memory: MemoryMode::Bump,
            ..KernelConfig::default()
        };
        let kernel = boot(config);
        assert!(kernel.heap().is_none());
        assert_eq!(kernel.registry().len(), 2);
    }

    #[test]
    fn test_sys_req_validates_before_posting() {
        let mut kernel = boot(KernelConfig::default());

        assert_eq!(kernel.sys_req(SYS_WRITE, DEFAULT_DEVICE, None), Err(SyscallError::InvalidBuffer));
        assert_eq!(kernel.sys_req(9, DEFAULT_DEVICE, None), Err(SyscallError::InvalidOperation(9)));
        assert!(kernel.requests.is_empty());
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut kernel = boot(KernelConfig::default());
        kernel.create("worker", ProcessClass::User, 3).unwrap();
        kernel.shutdown().unwrap();

        assert!(kernel.heap().unwrap().is_empty());
        assert!(!kernel.serial().is_open());
        assert!(kernel.registry().is_empty());
    }
}
