//! Single-device I/O scheduler
//!
//! The I/O control block (IOCB) records the request the device is working
//! on and shares the completion event flag with the driver. Requests that
//! arrive while the device is busy wait in a FIFO; each queued request holds
//! a block from the memory capability until it is started.
//!
//! ## Completion
//!
//! The driver raises the flag from interrupt context. Nothing is released
//! there: [`IoScheduler::check_completion`] is polled on every trap, hands
//! back the owner of the finished request and starts the next one.

use std::collections::VecDeque;

use ember_allocator::MemoryCapability;
use ember_drivers::{EventFlag, Hardware, SerialPort};

use super::{IoError, IoOp, IoRequest};
use crate::objects::ProcessId;
use crate::syscall::DeviceId;

/// Bytes reserved from the memory capability for each queued request
pub const IO_REQUEST_BYTES: usize = 32;

/// What [`IoScheduler::submit`] did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Handed to the driver immediately
    Started,
    /// Waiting behind the request in flight
    Queued,
}

/// I/O control block for one device
#[derive(Debug)]
struct Iocb {
    device: DeviceId,
    event: EventFlag,
    active: Option<IoRequest>,
}

pub struct IoScheduler {
    iocb: Iocb,
    pending: VecDeque<IoRequest>,
}

impl IoScheduler {
    /// Scheduler for `device`, sharing `event` with its driver
    pub fn new(device: DeviceId, event: EventFlag) -> Self {
        Self {
            iocb: Iocb {
                device,
                event,
                active: None,
            },
            pending: VecDeque::new(),
        }
    }

    #[inline]
    pub fn device(&self) -> DeviceId {
        self.iocb.device
    }

    #[inline]
    pub fn event(&self) -> &EventFlag {
        &self.iocb.event
    }

    /// True while a request is in flight
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.iocb.active.is_some()
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Owner of the request in flight
    pub fn active_owner(&self) -> Option<ProcessId> {
        self.iocb.active.as_ref().map(|request| request.owner)
    }

    /// Accept a request: start it if the device is idle, otherwise queue it.
    ///
    /// # Arguments
    /// * `memory` - source of the block held by a queued request
    /// * `port` - driver for the scheduler's device
    /// * `request` - transfer to perform
    pub fn submit<H: Hardware>(
        &mut self,
        memory: &mut dyn MemoryCapability,
        port: &mut SerialPort<H>,
        mut request: IoRequest,
    ) -> Result<Submitted, IoError> {
        if request.device != self.iocb.device {
            log::warn!("[io] request for unknown device {:?}", request.device);
            return Err(IoError::UnknownDevice(request.device));
        }

        if self.iocb.active.is_none() {
            self.start(port, request);
            return Ok(Submitted::Started);
        }

        let record = memory.allocate(IO_REQUEST_BYTES).map_err(IoError::OutOfMemory)?;
        request.record = Some(record);
        log::debug!("[io] device busy, queued {:?} for {}", request.op, request.owner);
        self.pending.push_back(request);
        Ok(Submitted::Queued)
    }

    /// Hand a request to the driver and make it the one in flight.
    ///
    /// A request the driver refuses is completed on the spot: the error
    /// code goes into its buffer and the flag is raised.
    fn start<H: Hardware>(&mut self, port: &mut SerialPort<H>, request: IoRequest) {
        self.iocb.event.clear();

        let outcome = match request.op {
            IoOp::Read => port.read(&request.buffer).map_err(|err| err.code()),
            IoOp::Write => port.write(&request.buffer).map_err(|err| err.code()),
        };
        if let Err(code) = outcome {
            log::warn!("[io] {:?} for {} refused by driver ({})", request.op, request.owner, code);
            request.buffer.fail(code);
            self.iocb.event.set();
        }

        self.iocb.active = Some(request);
    }

    /// Poll for completion of the request in flight.
    ///
    /// Returns the owner to release, after starting the next queued request.
    pub fn check_completion<H: Hardware>(
        &mut self,
        memory: &mut dyn MemoryCapability,
        port: &mut SerialPort<H>,
    ) -> Option<ProcessId> {
        if !self.iocb.event.is_set() {
            return None;
        }
        let finished = self.iocb.active.take()?;
        log::debug!("[io] {:?} for {} complete", finished.op, finished.owner);

        if let Some(mut next) = self.pending.pop_front() {
            if let Some(record) = next.record.take() {
                if let Err(err) = memory.free(record) {
                    log::warn!("[io] request record not returned: {}", err);
                }
            }
            self.start(port, next);
        }

        Some(finished.owner)
    }

    /// Drop every queued request owned by `owner`, returning how many.
    ///
    /// A request already in flight is left to finish.
    pub fn cancel(&mut self, memory: &mut dyn MemoryCapability, owner: ProcessId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|request| {
            if request.owner != owner {
                return true;
            }
            if let Some(record) = request.record {
                if let Err(err) = memory.free(record) {
                    log::warn!("[io] request record not returned: {}", err);
                }
            }
            false
        });

        let dropped = before - self.pending.len();
        if dropped > 0 {
            log::debug!("[io] cancelled {} queued requests of {}", dropped, owner);
        }
        dropped
    }
}

impl core::fmt::Debug for IoScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IoScheduler")
            .field("device", &self.iocb.device)
            .field("active", &self.active_owner())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::DEFAULT_DEVICE;
    use ember_allocator::{BumpMemory, Heap};
    use ember_drivers::serial::COM1;
    use ember_drivers::{IoBuffer, LoopbackUart};

    fn pid(index: u32) -> ProcessId {
        ProcessId { index, generation: 0 }
    }

    fn setup() -> (IoScheduler, SerialPort<LoopbackUart>, Heap) {
        let event = EventFlag::new();
        let mut port = SerialPort::new(LoopbackUart::new(COM1), COM1);
        port.open(Some(event.clone()), 9600).unwrap();
        (IoScheduler::new(DEFAULT_DEVICE, event), port, Heap::new(4096).unwrap())
    }

    fn write(owner: u32, text: &[u8]) -> IoRequest {
        IoRequest::new(IoOp::Write, DEFAULT_DEVICE, IoBuffer::for_write(text), pid(owner))
    }

    #[test]
    fn test_idle_device_starts_without_queueing() {
        let (mut io, mut port, mut heap) = setup();

        assert_eq!(io.submit(&mut heap, &mut port, write(0, b"hi")), Ok(Submitted::Started));
        assert!(io.is_busy());
        assert_eq!(io.pending_len(), 0);
        assert!(heap.is_empty());
        assert!(!io.event().is_set());
    }

    #[test]
    fn test_busy_device_queues_in_order() {
        let (mut io, mut port, mut heap) = setup();

        io.submit(&mut heap, &mut port, write(0, b"one")).unwrap();
        assert_eq!(io.submit(&mut heap, &mut port, write(1, b"two")), Ok(Submitted::Queued));
        assert_eq!(io.submit(&mut heap, &mut port, write(2, b"three")), Ok(Submitted::Queued));
        assert_eq!(heap.show_allocated().len(), 2);

        // Nothing finishes until the device interrupts
        assert_eq!(io.check_completion(&mut heap, &mut port), None);

        let mut released = Vec::new();
        for _ in 0..3 {
            port.service_interrupts();
            released.extend(io.check_completion(&mut heap, &mut port));
        }

        assert_eq!(released, [pid(0), pid(1), pid(2)]);
        assert!(!io.is_busy());
        assert!(heap.is_empty());
        assert_eq!(port.hardware().transmitted(), b"onetwothree");
    }

    #[test]
    fn test_raised_flag_without_request_releases_nobody() {
        let (mut io, mut port, mut heap) = setup();
        io.event().set();
        assert_eq!(io.check_completion(&mut heap, &mut port), None);
    }

    #[test]
    fn test_driver_refusal_is_recorded() {
        let (mut io, mut port, mut heap) = setup();
        port.close().unwrap();

        let buffer = IoBuffer::for_read(4);
        let request = IoRequest::new(IoOp::Read, DEFAULT_DEVICE, buffer.clone(), pid(3));
        assert_eq!(io.submit(&mut heap, &mut port, request), Ok(Submitted::Started));

        assert_eq!(buffer.error(), Some(-301));
        assert_eq!(buffer.count(), 0);
        assert_eq!(io.check_completion(&mut heap, &mut port), Some(pid(3)));
    }

    #[test]
    fn test_unknown_device_rejected() {
        let (mut io, mut port, mut heap) = setup();
        let request = IoRequest::new(IoOp::Write, DeviceId(9), IoBuffer::for_write(b"x"), pid(0));
        assert_eq!(
            io.submit(&mut heap, &mut port, request),
            Err(IoError::UnknownDevice(DeviceId(9)))
        );
        assert!(!io.is_busy());
    }

    #[test]
    fn test_queue_needs_memory() {
        let (mut io, mut port, _) = setup();
        let mut memory = BumpMemory::new(IO_REQUEST_BYTES);

        io.submit(&mut memory, &mut port, write(0, b"a")).unwrap();
        io.submit(&mut memory, &mut port, write(1, b"b")).unwrap();
        let refused = io.submit(&mut memory, &mut port, write(2, b"c"));

        assert!(matches!(refused, Err(IoError::OutOfMemory(_))));
        assert_eq!(io.pending_len(), 1);
    }

    #[test]
    fn test_cancel_drops_only_queued_requests_of_owner() {
        let (mut io, mut port, mut heap) = setup();
        io.submit(&mut heap, &mut port, write(5, b"active")).unwrap();
        io.submit(&mut heap, &mut port, write(5, b"q1")).unwrap();
        io.submit(&mut heap, &mut port, write(6, b"q2")).unwrap();
        io.submit(&mut heap, &mut port, write(5, b"q3")).unwrap();

        assert_eq!(io.cancel(&mut heap, pid(5)), 2);
        assert_eq!(io.pending_len(), 1);
        assert_eq!(io.active_owner(), Some(pid(5)));
        assert_eq!(heap.show_allocated().len(), 1);

        port.service_interrupts();
        assert_eq!(io.check_completion(&mut heap, &mut port), Some(pid(5)));
        port.service_interrupts();
        assert_eq!(io.check_completion(&mut heap, &mut port), Some(pid(6)));
        assert!(heap.is_empty());
    }
}
