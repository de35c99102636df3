//! Scripted simulation
//!
//! The harness stands in for the processes: whenever the kernel resumes a
//! scripted process, its next step becomes a system request and the harness
//! traps back in. Processes without a script (the idle processes) yield.
//! Serial interrupts are delivered after every trap.

use std::collections::HashMap;

use anyhow::{Context as _, Result};
use ember_drivers::serial::COM1;
use ember_drivers::{IoBuffer, LoopbackUart};
use ember_kernel::numbers::{SYS_EXIT, SYS_IDLE, SYS_READ, SYS_WRITE};
use ember_kernel::{Context, Kernel, KernelError, DEFAULT_DEVICE};

use crate::script::{SimFile, Step};

/// Entry points handed to scripted processes, one page apart
const SCRIPT_ENTRY_BASE: u32 = 0x0010_0000;

struct Program {
    steps: Vec<Step>,
    next: usize,
}

impl Program {
    /// Next step; a script that has run out exits
    fn advance(&mut self) -> Step {
        let step = self.steps.get(self.next).cloned().unwrap_or(Step::Exit);
        self.next += 1;
        step
    }
}

/// A completed or pending read, kept for the report
pub struct ReadRecord {
    pub process: String,
    pub buffer: IoBuffer,
}

/// What a run produced
pub struct Report {
    /// Name of the process resumed by each trap
    pub order: Vec<String>,
    pub transmitted: Vec<u8>,
    pub reads: Vec<ReadRecord>,
    pub switches: u64,
    pub returned_home: bool,
}

pub struct Simulation {
    kernel: Kernel<LoopbackUart>,
    programs: HashMap<String, Program>,
    reads: Vec<ReadRecord>,
}

impl Simulation {
    /// Boot the kernel and create one process per script.
    pub fn new(sim: SimFile) -> Result<Self> {
        let mut kernel =
            Kernel::boot(sim.kernel, LoopbackUart::detached(COM1)).context("Kernel boot failed")?;

        let mut programs = HashMap::new();
        for (slot, script) in sim.scripts.into_iter().enumerate() {
            let entry = SCRIPT_ENTRY_BASE + (slot as u32) * 0x1000;
            kernel
                .load(&script.name, script.class, script.priority, entry)
                .with_context(|| format!("Failed to create process '{}'", script.name))?;
            kernel.resume(&script.name);
            programs.insert(
                script.name,
                Program {
                    steps: script.steps,
                    next: 0,
                },
            );
        }

        if let Some(input) = sim.input {
            kernel.serial_mut().hardware_mut().inject(input.as_bytes());
        }

        Ok(Self {
            kernel,
            programs,
            reads: Vec::new(),
        })
    }

    /// Request for the running process's next step
    fn next_request(&mut self, name: &str) -> (u32, Option<IoBuffer>) {
        let step = match self.programs.get_mut(name) {
            Some(program) => program.advance(),
            None => Step::Yield,
        };
        match step {
            Step::Yield => (SYS_IDLE, None),
            Step::Exit => (SYS_EXIT, None),
            Step::Write(text) => (SYS_WRITE, Some(IoBuffer::for_write(text.as_bytes()))),
            Step::Read(count) => {
                let buffer = IoBuffer::for_read(count);
                self.reads.push(ReadRecord {
                    process: name.to_string(),
                    buffer: buffer.clone(),
                });
                (SYS_READ, Some(buffer))
            }
        }
    }

    /// Run up to `cycles` traps, then shut the kernel down.
    pub fn run(mut self, cycles: usize) -> Result<Report> {
        let boot = Context::default();
        let mut order = Vec::new();
        let mut returned_home = false;

        let mut ctx = self.kernel.dispatch(boot).context("First dispatch failed")?;
        for _ in 0..cycles {
            let Some(name) = self.kernel.running_name().map(str::to_string) else {
                returned_home = true;
                break;
            };
            order.push(name.clone());

            let (op, buffer) = self.next_request(&name);
            ctx = match self.kernel.syscall(op, DEFAULT_DEVICE, buffer, ctx) {
                Ok(next) => next,
                Err(KernelError::Syscall(err)) => {
                    log::warn!("[sim] '{}' request refused: {}", name, err);
                    // The process did not trap; treat it as a yield
                    self.kernel
                        .syscall(SYS_IDLE, DEFAULT_DEVICE, None, ctx)
                        .context("Dispatch failed")?
                }
                Err(err) => return Err(err).with_context(|| format!("Trap from '{}' failed", name)),
            };
            self.kernel.service_interrupts();
        }

        if self.kernel.running().is_some() {
            self.kernel.request_shutdown();
            self.kernel
                .syscall(SYS_IDLE, DEFAULT_DEVICE, None, ctx)
                .context("Shutdown dispatch failed")?;
        }

        let report = Report {
            order,
            transmitted: self.kernel.serial().hardware().transmitted().to_vec(),
            reads: self.reads,
            switches: self.kernel.switches(),
            returned_home,
        };
        self.kernel.shutdown().context("Kernel shutdown failed")?;
        Ok(report)
    }
}
