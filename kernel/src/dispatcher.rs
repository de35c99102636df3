//! Trap dispatcher
//!
//! Every trap lands in [`Kernel::dispatch`] with the context of whoever
//! trapped. The dispatcher acts on the request the running process left in
//! the request slot, polls the I/O scheduler, and returns the context to
//! resume.
//!
//! ## Per-trap sequence
//!
//! ```text
//! request ──▶ IDLE        save context, keep as preserved
//!        ──▶ EXIT        cancel queued I/O, destroy record
//!        ──▶ READ/WRITE  save context, submit, block
//! poll I/O completion ──▶ release owner
//! pick Ready head ──▶ requeue preserved ──▶ resume head
//! ```
//!
//! With no process running (the first trap), the incoming context is kept
//! as the boot context: it is what the kernel returns to on shutdown.

use ember_drivers::Hardware;

use crate::context::Context;
use crate::error::Fatal;
use crate::io::{IoOp, IoRequest};
use crate::kernel::Kernel;
use crate::objects::ProcessId;
use crate::syscall::{OpCode, Request};

/// Dispatcher state carried between traps
#[derive(Debug, Default)]
pub struct Dispatcher {
    running: Option<ProcessId>,
    boot_context: Option<Context>,
    halted: Option<Fatal>,
    switches: u64,
}

impl Dispatcher {
    pub const fn new() -> Self {
        Self {
            running: None,
            boot_context: None,
            halted: None,
            switches: 0,
        }
    }

    #[inline]
    pub fn running(&self) -> Option<ProcessId> {
        self.running
    }

    #[inline]
    pub fn halted(&self) -> Option<&Fatal> {
        self.halted.as_ref()
    }

    #[inline]
    pub fn switches(&self) -> u64 {
        self.switches
    }

    #[inline]
    pub fn boot_context(&self) -> Option<&Context> {
        self.boot_context.as_ref()
    }

    pub(crate) fn clear_running(&mut self) {
        self.running = None;
    }
}

impl<H: Hardware> Kernel<H> {
    fn halt(&mut self, fatal: Fatal) -> Fatal {
        log::error!("[dispatch] kernel halted: {}", fatal);
        self.dispatcher.halted = Some(fatal.clone());
        fatal
    }

    fn boot_context_or(&self, saved: Context) -> Context {
        self.dispatcher.boot_context.unwrap_or(saved)
    }

    /// Handle one trap.
    ///
    /// # Arguments
    /// * `saved` - context of the code that trapped
    ///
    /// Returns the context to resume: a process, or the boot context once
    /// the kernel is shutting down.
    pub fn dispatch(&mut self, saved: Context) -> Result<Context, Fatal> {
        if let Some(fatal) = &self.dispatcher.halted {
            return Err(fatal.clone());
        }

        let request = self.requests.take();
        let mut preserved = None;

        match self.dispatcher.running.take() {
            None => {
                self.dispatcher.boot_context = Some(saved);
            }
            Some(current) => {
                preserved = self.handle_request(current, request, &saved)?;
            }
        }

        if let Some(owner) = self.io.check_completion(&mut self.memory, &mut self.serial) {
            if let Err(err) = self.registry.release(owner) {
                log::warn!("[dispatch] I/O owner {} not released: {}", owner, err);
            }
        }

        if self.shutdown {
            if let Some(process) = preserved {
                self.requeue(process);
            }
            log::info!("[dispatch] returning to boot context");
            return Ok(self.boot_context_or(saved));
        }

        match self.registry.take_ready_head() {
            Some(next) => {
                if let Some(process) = preserved {
                    self.requeue(process);
                }
                self.switch_to(next)
            }
            // Nothing else is ready: the preserved process keeps the CPU
            None => match preserved {
                Some(process) => self.switch_to(process),
                None if self.config.shutdown_on_empty => {
                    log::info!("[dispatch] ready queue empty, returning to boot context");
                    Ok(self.boot_context_or(saved))
                }
                None => Err(self.halt(Fatal::EmptyReadyQueue)),
            },
        }
    }

    /// Act on the running process's request.
    ///
    /// Returns the process if it keeps its claim on the CPU.
    fn handle_request(
        &mut self,
        current: ProcessId,
        request: Option<Request>,
        saved: &Context,
    ) -> Result<Option<ProcessId>, Fatal> {
        let op_code = request.as_ref().map(|request| request.op_code);
        let op = match op_code.map(OpCode::try_from) {
            Some(Ok(op)) => op,
            Some(Err(code)) => return Err(self.halt(Fatal::InvalidRequest(Some(code)))),
            None => return Err(self.halt(Fatal::InvalidRequest(None))),
        };

        match IoOp::try_from(op) {
            Ok(io_op) => self.start_io(current, io_op, request, saved, op_code),
            Err(OpCode::Exit) => {
                self.io.cancel(&mut self.memory, current);
                if let Err(err) = self.registry.destroy(&mut self.memory, current) {
                    log::warn!("[dispatch] exiting process {} not destroyed: {}", current, err);
                }
                Ok(None)
            }
            // IDLE
            Err(_) => {
                self.save(current, saved);
                Ok(Some(current))
            }
        }
    }

    /// Hand a READ or WRITE to the I/O scheduler and block the caller.
    ///
    /// A refused submission leaves the caller running with the error code
    /// in its buffer.
    fn start_io(
        &mut self,
        current: ProcessId,
        io_op: IoOp,
        request: Option<Request>,
        saved: &Context,
        op_code: Option<u32>,
    ) -> Result<Option<ProcessId>, Fatal> {
        let Some(Request {
            device,
            buffer: Some(buffer),
            ..
        }) = request
        else {
            return Err(self.halt(Fatal::InvalidRequest(op_code)));
        };

        self.save(current, saved);
        let submitted = self.io.submit(
            &mut self.memory,
            &mut self.serial,
            IoRequest::new(io_op, device, buffer.clone(), current),
        );
        match submitted {
            Ok(_) => {
                if let Err(err) = self.registry.park_blocked(current) {
                    log::warn!("[dispatch] {} not blocked: {}", current, err);
                }
                Ok(None)
            }
            Err(err) => {
                log::warn!("[dispatch] {:?} for {} refused: {}", io_op, current, err);
                buffer.fail(err.code());
                Ok(Some(current))
            }
        }
    }

    fn save(&mut self, process: ProcessId, context: &Context) {
        if let Err(err) = self.registry.save_context(process, context) {
            log::warn!("[dispatch] context of {} not saved: {}", process, err);
        }
    }

    fn requeue(&mut self, process: ProcessId) {
        if let Err(err) = self.registry.requeue_yielded(process) {
            log::warn!("[dispatch] {} not requeued: {}", process, err);
        }
    }

    /// Make `next` the running process and hand back its context.
    fn switch_to(&mut self, next: ProcessId) -> Result<Context, Fatal> {
        match self.registry.context(next) {
            Ok(context) => {
                self.dispatcher.running = Some(next);
                self.dispatcher.switches += 1;
                log::debug!(
                    "[dispatch] resume {}",
                    self.registry.get(next).map_or("?", |pcb| pcb.name())
                );
                Ok(context)
            }
            Err(err) => {
                log::error!("[dispatch] selected process {} vanished: {}", next, err);
                Err(self.halt(Fatal::EmptyReadyQueue))
            }
        }
    }
}
