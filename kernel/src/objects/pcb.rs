//! Process Control Block (PCB)
//!
//! A PCB is the kernel's record of one process:
//! - identity (name, class) and scheduling priority
//! - lifecycle state
//! - a private fixed-size stack holding the saved context
//!
//! ## Process Lifecycle
//!
//! ```text
//!          block                      suspend
//!   Ready ───────▶ Blocked     Ready ────────▶ ReadySuspended
//!     ▲ │ ◀─────── unblock       ▲   ◀──────── resume
//!     │ ▼ dispatch
//!   Running ── yield ──▶ Ready
//!           ── read/write ──▶ Blocked
//!           ── exit ──▶ (destroyed)
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::context::{Context, CONTEXT_SIZE};

/// Bytes of private stack per process
pub const STACK_SIZE: usize = 1024;

/// Name length limits, in characters
pub const NAME_MIN: usize = 3;
pub const NAME_MAX: usize = 20;

/// Highest priority (runs first)
pub const MAX_PRIORITY: u8 = 9;

/// Control fields accounted for on top of the stack
const CONTROL_BYTES: usize = 64;

/// Bytes reserved from the memory capability for every process record
pub const PCB_RECORD_BYTES: usize = STACK_SIZE + CONTROL_BYTES;

const_assert!(CONTEXT_SIZE < STACK_SIZE);

/// Who a process belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessClass {
    /// Kernel-owned; the shell may not suspend, resume or reprioritize it
    System,
    User,
}

/// Process state
///
/// Every state except `Running` corresponds to exactly one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    ReadySuspended,
    BlockedSuspended,
}

impl ProcessState {
    #[inline]
    pub fn is_suspended(self) -> bool {
        matches!(self, ProcessState::ReadySuspended | ProcessState::BlockedSuspended)
    }

    #[inline]
    pub fn is_blocked(self) -> bool {
        matches!(self, ProcessState::Blocked | ProcessState::BlockedSuspended)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Blocked => "blocked",
            ProcessState::ReadySuspended => "suspended-ready",
            ProcessState::BlockedSuspended => "suspended-blocked",
        };
        f.write_str(label)
    }
}

/// Stable handle to a process record
///
/// The generation changes whenever a slot is reused, so a handle held past
/// the process's death never resolves to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid{}.{}", self.index, self.generation)
    }
}

/// Process Control Block
pub struct Pcb {
    name: String,
    class: ProcessClass,
    /// 0 (lowest) ..= 9 (highest)
    priority: u8,
    state: ProcessState,

    /// Private stack; the saved context sits at `stack_top`
    stack: Box<[u8]>,
    /// Offset into `stack` of the saved context
    stack_top: usize,

    /// Address of the block reserved for this record
    record: usize,

    /// Dispatch round the process is queued for
    pub(crate) epoch: u64,
}

impl Pcb {
    /// Create a PCB in the Ready state.
    ///
    /// The stack holds an initial context with entry point 0 until
    /// [`Pcb::prepare`] lays down the real one.
    ///
    /// # Arguments
    /// * `record` - address returned by the memory capability for this PCB
    pub fn new(name: &str, class: ProcessClass, priority: u8, record: usize) -> Self {
        let mut pcb = Self {
            name: name.to_string(),
            class,
            priority,
            state: ProcessState::Ready,
            stack: vec![0u8; STACK_SIZE].into_boxed_slice(),
            stack_top: STACK_SIZE - CONTEXT_SIZE,
            record,
            epoch: 0,
        };
        pcb.prepare(0);
        pcb
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn class(&self) -> ProcessClass {
        self.class
    }

    #[inline]
    pub fn is_system(&self) -> bool {
        self.class == ProcessClass::System
    }

    #[inline]
    pub fn priority(&self) -> u8 {
        self.priority
    }

    #[inline]
    pub(crate) fn set_priority(&mut self, priority: u8) {
        self.priority = priority;
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }

    #[inline]
    pub fn record(&self) -> usize {
        self.record
    }

    /// Address of the lowest stack byte
    ///
    /// The stack occupies the start of the record block.
    #[inline]
    pub fn stack_base(&self) -> u32 {
        self.record as u32
    }

    /// Address the saved context is stored at
    #[inline]
    pub fn stack_top(&self) -> u32 {
        self.stack_base() + self.stack_top as u32
    }

    /// Overwrite the saved context
    pub fn save_context(&mut self, context: &Context) {
        let top = self.stack_top;
        context.write_to(&mut self.stack[top..top + CONTEXT_SIZE]);
    }

    /// The saved context
    pub fn context(&self) -> Context {
        Context::read_from(&self.stack[self.stack_top..self.stack_top + CONTEXT_SIZE])
    }

    /// Lay down the context a new process starts from
    pub fn prepare(&mut self, entry: u32) {
        let initial = Context::initial(entry, self.stack_base(), self.stack_top());
        self.save_context(&initial);
    }
}

impl fmt::Debug for Pcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pcb")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("stack_top", &format_args!("{:#x}", self.stack_top()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pcb_is_ready() {
        let pcb = Pcb::new("alpha", ProcessClass::User, 4, 0x400);
        assert_eq!(pcb.state(), ProcessState::Ready);
        assert_eq!(pcb.priority(), 4);
        assert!(!pcb.is_system());
        assert_eq!(pcb.stack_top(), 0x400 + (STACK_SIZE - CONTEXT_SIZE) as u32);
    }

    #[test]
    fn test_new_pcb_has_startable_context() {
        let pcb = Pcb::new("fresh", ProcessClass::User, 5, 0x800);
        let ctx = pcb.context();

        assert_eq!(ctx.cs, Context::CODE_SEGMENT);
        for segment in [ctx.ds, ctx.es, ctx.fs, ctx.gs] {
            assert_eq!(segment, Context::DATA_SEGMENT);
        }
        assert_eq!(ctx.eflags, Context::INITIAL_EFLAGS);
        assert_eq!(ctx.esp, pcb.stack_top());
        assert_eq!(ctx.ebp, 0x800);
        assert_eq!(ctx.eip, 0);
    }

    #[test]
    fn test_prepare_writes_initial_context() {
        let mut pcb = Pcb::new("idle", ProcessClass::System, 0, 0x2000);
        pcb.prepare(0x1234);

        let ctx = pcb.context();
        assert_eq!(ctx.eip, 0x1234);
        assert_eq!(ctx.ebp, 0x2000);
        assert_eq!(ctx.esp, pcb.stack_top());
        assert_eq!(ctx.eflags, Context::INITIAL_EFLAGS);
    }

    #[test]
    fn test_saved_context_is_replaced() {
        let mut pcb = Pcb::new("beta", ProcessClass::User, 1, 0);
        pcb.prepare(0x10);

        let mut ctx = pcb.context();
        ctx.eax = 42;
        pcb.save_context(&ctx);
        assert_eq!(pcb.context().eax, 42);
    }

    #[test]
    fn test_state_predicates() {
        assert!(ProcessState::BlockedSuspended.is_suspended());
        assert!(ProcessState::BlockedSuspended.is_blocked());
        assert!(!ProcessState::Running.is_blocked());
        assert_eq!(ProcessState::ReadySuspended.to_string(), "suspended-ready");
    }
}
