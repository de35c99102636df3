//! Process Registry
//!
//! Creation, destruction and every state transition of process records.
//! Shell-facing operations address processes by name; the dispatcher and
//! I/O scheduler use [`ProcessId`] handles.
//!
//! ## Dispatch rounds
//!
//! Each Ready entry carries the round (epoch) it is queued for. Processes
//! made ready by create/unblock/resume join the current round; a process
//! that yields joins the next one. Within a round the Ready queue is in
//! priority order, so every runnable process gets one turn per round,
//! highest priority first.

use ember_allocator::MemoryCapability;

use super::queue::{Discipline, ProcessQueue, QueueKind};
use super::table::ProcessTable;
use super::{RegistryError, Result};
use crate::context::Context;
use crate::objects::{
    Pcb, ProcessClass, ProcessId, ProcessState, MAX_PRIORITY, NAME_MAX, NAME_MIN, PCB_RECORD_BYTES,
};

/// Snapshot of one process for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub name: String,
    pub class: ProcessClass,
    pub state: ProcessState,
    pub priority: u8,
}

/// Owner of all process records and the four queues
pub struct ProcessRegistry {
    table: ProcessTable,
    ready: ProcessQueue,
    blocked: ProcessQueue,
    suspended_ready: ProcessQueue,
    suspended_blocked: ProcessQueue,
    /// Round currently being dispatched
    epoch: u64,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub const fn new() -> Self {
        Self {
            table: ProcessTable::new(),
            ready: ProcessQueue::new(QueueKind::Ready),
            blocked: ProcessQueue::new(QueueKind::Blocked),
            suspended_ready: ProcessQueue::new(QueueKind::SuspendedReady),
            suspended_blocked: ProcessQueue::new(QueueKind::SuspendedBlocked),
            epoch: 0,
        }
    }

    // ------------------------------------------------------------------
    // Queue plumbing
    // ------------------------------------------------------------------

    fn queue(&self, kind: QueueKind) -> &ProcessQueue {
        match kind {
            QueueKind::Ready => &self.ready,
            QueueKind::Blocked => &self.blocked,
            QueueKind::SuspendedReady => &self.suspended_ready,
            QueueKind::SuspendedBlocked => &self.suspended_blocked,
        }
    }

    fn parts(&mut self, kind: QueueKind) -> (&mut ProcessQueue, &mut ProcessTable) {
        let queue = match kind {
            QueueKind::Ready => &mut self.ready,
            QueueKind::Blocked => &mut self.blocked,
            QueueKind::SuspendedReady => &mut self.suspended_ready,
            QueueKind::SuspendedBlocked => &mut self.suspended_blocked,
        };
        (queue, &mut self.table)
    }

    /// Detach a record from whichever queue its state places it in.
    fn unlink(&mut self, index: usize) {
        if let Some(kind) = QueueKind::for_state(self.table[index].pcb.state()) {
            let (queue, table) = self.parts(kind);
            queue.remove(table, index);
        }
    }

    /// Give a detached record `state` and link it into the matching queue.
    fn link(&mut self, index: usize, state: ProcessState, epoch: u64) {
        let pcb = &mut self.table[index].pcb;
        pcb.set_state(state);
        // Rounds only order the Ready queue; suspended processes rank by priority alone
        pcb.epoch = if state == ProcessState::Ready { epoch } else { 0 };

        if let Some(kind) = QueueKind::for_state(state) {
            let (queue, table) = self.parts(kind);
            queue.enqueue(table, index);
        }
    }

    fn move_to(&mut self, index: usize, state: ProcessState) {
        self.unlink(index);
        self.link(index, state, self.epoch);
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.table.position(name).ok_or_else(|| {
            log::warn!("[sched] no process named '{}'", name);
            RegistryError::NotFound(name.to_string())
        })
    }

    fn resolve(&self, id: ProcessId) -> Result<usize> {
        self.table.resolve(id).ok_or(RegistryError::StaleHandle)
    }

    fn info(&self, index: usize) -> ProcessInfo {
        let pcb = &self.table[index].pcb;
        ProcessInfo {
            id: self.table.id_at(index),
            name: pcb.name().to_string(),
            class: pcb.class(),
            state: pcb.state(),
            priority: pcb.priority(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a process in the Ready state.
    ///
    /// # Arguments
    /// * `memory` - source of the record's block
    /// * `name` - unique name, 3 to 20 characters
    /// * `class` - System or User
    /// * `priority` - 0 (lowest) to 9 (highest)
    pub fn create(
        &mut self,
        memory: &mut dyn MemoryCapability,
        name: &str,
        class: ProcessClass,
        priority: u8,
    ) -> Result<ProcessId> {
        let length = name.chars().count();
        if !(NAME_MIN..=NAME_MAX).contains(&length) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if priority > MAX_PRIORITY {
            return Err(RegistryError::InvalidPriority(priority));
        }
        if self.table.position(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let record = memory
            .allocate(PCB_RECORD_BYTES)
            .map_err(RegistryError::OutOfMemory)?;

        let id = self.table.insert(Pcb::new(name, class, priority, record));
        let index = id.index as usize;
        self.link(index, ProcessState::Ready, self.epoch);

        log::debug!("[sched] created '{}' ({:?}, priority {}) as {}", name, class, priority, id);
        Ok(id)
    }

    /// Create a process suspended, with its initial context laid down.
    pub fn load(
        &mut self,
        memory: &mut dyn MemoryCapability,
        name: &str,
        class: ProcessClass,
        priority: u8,
        entry: u32,
    ) -> Result<ProcessId> {
        let id = self.create(memory, name, class, priority)?;
        let index = id.index as usize;
        self.table[index].pcb.prepare(entry);
        self.move_to(index, ProcessState::ReadySuspended);
        Ok(id)
    }

    /// Remove a queued process and release its record.
    pub fn delete(&mut self, memory: &mut dyn MemoryCapability, name: &str) -> Result<ProcessId> {
        let index = self.position(name)?;
        if self.table[index].pcb.state() == ProcessState::Running {
            return Err(RegistryError::Running(name.to_string()));
        }
        let id = self.table.id_at(index);
        self.destroy(memory, id)?;
        Ok(id)
    }

    /// Unlink and free a record, running or not.
    pub(crate) fn destroy(&mut self, memory: &mut dyn MemoryCapability, id: ProcessId) -> Result<()> {
        let index = self.resolve(id)?;
        self.unlink(index);
        let pcb = self.table.remove(id).ok_or(RegistryError::StaleHandle)?;

        if let Err(err) = memory.free(pcb.record()) {
            log::warn!("[sched] record of '{}' not returned: {}", pcb.name(), err);
        }
        log::debug!("[sched] destroyed '{}'", pcb.name());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn block_index(&mut self, index: usize) -> Result<bool> {
        let target = match self.table[index].pcb.state() {
            ProcessState::Ready => ProcessState::Blocked,
            ProcessState::ReadySuspended => ProcessState::BlockedSuspended,
            ProcessState::Blocked | ProcessState::BlockedSuspended => return Ok(false),
            ProcessState::Running => {
                return Err(RegistryError::Running(self.table[index].pcb.name().to_string()))
            }
        };
        self.move_to(index, target);
        Ok(true)
    }

    fn unblock_index(&mut self, index: usize) -> Result<bool> {
        let target = match self.table[index].pcb.state() {
            ProcessState::Blocked => ProcessState::Ready,
            ProcessState::BlockedSuspended => ProcessState::ReadySuspended,
            ProcessState::Ready | ProcessState::ReadySuspended => return Ok(false),
            ProcessState::Running => {
                return Err(RegistryError::Running(self.table[index].pcb.name().to_string()))
            }
        };
        self.move_to(index, target);
        Ok(true)
    }

    /// Ready → Blocked, ReadySuspended → BlockedSuspended.
    ///
    /// Returns `Ok(false)` if the process is already blocked.
    pub fn block(&mut self, name: &str) -> Result<bool> {
        let index = self.position(name)?;
        self.block_index(index)
    }

    /// Blocked → Ready, BlockedSuspended → ReadySuspended.
    ///
    /// Returns `Ok(false)` if the process is not blocked.
    pub fn unblock(&mut self, name: &str) -> Result<bool> {
        let index = self.position(name)?;
        self.unblock_index(index)
    }

    /// Unblock by handle, used when an I/O request completes
    pub(crate) fn release(&mut self, id: ProcessId) -> Result<bool> {
        let index = self.resolve(id)?;
        self.unblock_index(index)
    }

    /// Move a process onto the suspended half of its axis.
    ///
    /// Returns false if it is already suspended, running, or unknown.
    pub fn suspend(&mut self, name: &str) -> bool {
        let Ok(index) = self.position(name) else {
            return false;
        };
        let target = match self.table[index].pcb.state() {
            ProcessState::Ready => ProcessState::ReadySuspended,
            ProcessState::Blocked => ProcessState::BlockedSuspended,
            _ => return false,
        };
        self.move_to(index, target);
        log::debug!("[sched] suspended '{}'", name);
        true
    }

    /// Inverse of [`ProcessRegistry::suspend`].
    pub fn resume(&mut self, name: &str) -> bool {
        let Ok(index) = self.position(name) else {
            return false;
        };
        let target = match self.table[index].pcb.state() {
            ProcessState::ReadySuspended => ProcessState::Ready,
            ProcessState::BlockedSuspended => ProcessState::Blocked,
            _ => return false,
        };
        self.move_to(index, target);
        log::debug!("[sched] resumed '{}'", name);
        true
    }

    /// Resume every suspended process: Suspended-Ready first, then
    /// Suspended-Blocked. Returns the number moved.
    pub fn resume_all(&mut self) -> usize {
        let mut moved = 0;
        while let Some(index) = self.suspended_ready.head() {
            self.move_to(index, ProcessState::Ready);
            moved += 1;
        }
        while let Some(index) = self.suspended_blocked.head() {
            self.move_to(index, ProcessState::Blocked);
            moved += 1;
        }
        log::debug!("[sched] resumed {} processes", moved);
        moved
    }

    /// Change a process's priority, repositioning it in a priority queue.
    pub fn set_priority(&mut self, name: &str, priority: u8) -> Result<()> {
        if priority > MAX_PRIORITY {
            return Err(RegistryError::InvalidPriority(priority));
        }
        let index = self.position(name)?;
        let state = self.table[index].pcb.state();
        self.table[index].pcb.set_priority(priority);

        let reorder = QueueKind::for_state(state).map(QueueKind::discipline) == Some(Discipline::Priority);
        if reorder {
            let epoch = self.table[index].pcb.epoch;
            self.unlink(index);
            self.link(index, state, epoch);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatcher hooks
    // ------------------------------------------------------------------

    /// Detach the head of Ready and mark it Running.
    pub(crate) fn take_ready_head(&mut self) -> Option<ProcessId> {
        let index = self.ready.pop_front(&mut self.table)?;
        let pcb = &mut self.table[index].pcb;
        pcb.set_state(ProcessState::Running);
        self.epoch = self.epoch.max(pcb.epoch);
        Some(self.table.id_at(index))
    }

    /// Put a running process back on Ready, in the round after the one it
    /// was dispatched in.
    pub(crate) fn requeue_yielded(&mut self, id: ProcessId) -> Result<()> {
        let index = self.resolve(id)?;
        let next_round = self.table[index].pcb.epoch + 1;
        self.link(index, ProcessState::Ready, next_round);
        Ok(())
    }

    /// Handles of every live process
    pub(crate) fn ids(&self) -> Vec<ProcessId> {
        self.table.iter().map(|(index, _)| self.table.id_at(index)).collect()
    }

    /// Move a running process onto the Blocked queue.
    pub(crate) fn park_blocked(&mut self, id: ProcessId) -> Result<()> {
        let index = self.resolve(id)?;
        self.link(index, ProcessState::Blocked, self.epoch);
        Ok(())
    }

    pub(crate) fn save_context(&mut self, id: ProcessId, context: &Context) -> Result<()> {
        let index = self.resolve(id)?;
        self.table[index].pcb.save_context(context);
        Ok(())
    }

    pub(crate) fn context(&self, id: ProcessId) -> Result<Context> {
        let index = self.resolve(id)?;
        Ok(self.table[index].pcb.context())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Which queue holds `name`; `None` if it is running or unknown.
    pub fn find(&self, name: &str) -> Option<QueueKind> {
        QueueKind::SEARCH_ORDER.into_iter().find(|kind| {
            self.queue(*kind)
                .indices(&self.table)
                .into_iter()
                .any(|index| self.table[index].pcb.name() == name)
        })
    }

    pub fn get(&self, id: ProcessId) -> Option<&Pcb> {
        self.table.resolve(id).map(|index| &self.table[index].pcb)
    }

    /// True for System processes, `None` if unknown
    pub fn is_system(&self, name: &str) -> Option<bool> {
        self.table
            .position(name)
            .map(|index| self.table[index].pcb.is_system())
    }

    pub fn show(&self, name: &str) -> Option<ProcessInfo> {
        self.table.position(name).map(|index| self.info(index))
    }

    fn snapshot(&self, kinds: &[QueueKind]) -> Vec<ProcessInfo> {
        kinds
            .iter()
            .flat_map(|kind| self.queue(*kind).indices(&self.table))
            .map(|index| self.info(index))
            .collect()
    }

    /// Ready then Suspended-Ready, each in queue order
    pub fn show_ready(&self) -> Vec<ProcessInfo> {
        self.snapshot(&[QueueKind::Ready, QueueKind::SuspendedReady])
    }

    /// Blocked then Suspended-Blocked, each in queue order
    pub fn show_blocked(&self) -> Vec<ProcessInfo> {
        self.snapshot(&[QueueKind::Blocked, QueueKind::SuspendedBlocked])
    }

    /// The running process (if any) followed by all four queues
    pub fn show_all(&self) -> Vec<ProcessInfo> {
        let running = self
            .table
            .iter()
            .filter(|(_, node)| node.pcb.state() == ProcessState::Running)
            .map(|(index, _)| self.info(index));
        running.chain(self.snapshot(&QueueKind::SEARCH_ORDER)).collect()
    }

    #[inline]
    pub fn queue_len(&self, kind: QueueKind) -> usize {
        self.queue(kind).len()
    }

    /// Live process records
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Check every queue and that each record is queued exactly where its
    /// state says.
    pub fn verify(&self) -> Result<()> {
        let mut queued = 0;
        for kind in QueueKind::SEARCH_ORDER {
            queued += self.queue(kind).verify(&self.table)?.len();
        }

        let running = self
            .table
            .iter()
            .filter(|(_, node)| node.pcb.state() == ProcessState::Running)
            .count();
        if running > 1 {
            return Err(RegistryError::Corrupt {
                queue: QueueKind::Ready,
                reason: "more than one running process",
            });
        }
        if queued + running != self.table.len() {
            return Err(RegistryError::Corrupt {
                queue: QueueKind::Ready,
                reason: "record missing from its queue",
            });
        }
        Ok(())
    }
}

impl core::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("ready", &self.ready.len())
            .field("blocked", &self.blocked.len())
            .field("suspended_ready", &self.suspended_ready.len())
            .field("suspended_blocked", &self.suspended_blocked.len())
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_allocator::{Heap, HeapError};

    fn setup() -> (ProcessRegistry, Heap) {
        (ProcessRegistry::new(), Heap::new(50_000).unwrap())
    }

    fn ready_names(registry: &ProcessRegistry) -> Vec<String> {
        registry
            .snapshot(&[QueueKind::Ready])
            .into_iter()
            .map(|info| info.name)
            .collect()
    }

    #[test]
    fn test_create_enqueues_by_priority() {
        let (mut registry, mut heap) = setup();
        for (name, priority) in [("five", 5), ("nine", 9), ("two", 2), ("nine2", 9)] {
            registry.create(&mut heap, name, ProcessClass::User, priority).unwrap();
        }

        assert_eq!(ready_names(&registry), ["nine", "nine2", "five", "two"]);
        assert_eq!(registry.find("two"), Some(QueueKind::Ready));
        registry.verify().unwrap();
    }

    #[test]
    fn test_create_validation() {
        let (mut registry, mut heap) = setup();

        assert_eq!(
            registry.create(&mut heap, "ab", ProcessClass::User, 1),
            Err(RegistryError::InvalidName("ab".into()))
        );
        assert_eq!(
            registry.create(&mut heap, "a_name_that_is_too_long", ProcessClass::User, 1),
            Err(RegistryError::InvalidName("a_name_that_is_too_long".into()))
        );
        assert_eq!(
            registry.create(&mut heap, "fine", ProcessClass::User, 10),
            Err(RegistryError::InvalidPriority(10))
        );
        assert!(heap.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected_until_deleted() {
        let (mut registry, mut heap) = setup();
        registry.create(&mut heap, "shell", ProcessClass::User, 5).unwrap();
        registry.suspend("shell");

        assert_eq!(
            registry.create(&mut heap, "shell", ProcessClass::User, 1),
            Err(RegistryError::DuplicateName("shell".into()))
        );

        registry.delete(&mut heap, "shell").unwrap();
        registry.create(&mut heap, "shell", ProcessClass::User, 1).unwrap();
    }

    #[test]
    fn test_records_come_from_memory() {
        let (mut registry, mut heap) = setup();
        registry.create(&mut heap, "alpha", ProcessClass::User, 1).unwrap();
        assert_eq!(heap.show_allocated().len(), 1);
        assert_eq!(heap.show_allocated()[0].size, PCB_RECORD_BYTES);

        registry.delete(&mut heap, "alpha").unwrap();
        assert!(heap.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_out_of_memory() {
        let mut registry = ProcessRegistry::new();
        let mut heap = Heap::new(PCB_RECORD_BYTES).unwrap();
        let result = registry.create(&mut heap, "big", ProcessClass::User, 1);
        assert!(matches!(result, Err(RegistryError::OutOfMemory(HeapError::OutOfMemory { .. }))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_delete_unknown() {
        let (mut registry, mut heap) = setup();
        assert_eq!(
            registry.delete(&mut heap, "ghost"),
            Err(RegistryError::NotFound("ghost".into()))
        );
    }

    #[test]
    fn test_block_unblock_transitions() {
        let (mut registry, mut heap) = setup();
        registry.create(&mut heap, "worker", ProcessClass::User, 3).unwrap();

        assert_eq!(registry.block("worker"), Ok(true));
        assert_eq!(registry.find("worker"), Some(QueueKind::Blocked));
        assert_eq!(registry.block("worker"), Ok(false));

        assert!(registry.suspend("worker"));
        assert_eq!(registry.find("worker"), Some(QueueKind::SuspendedBlocked));

        assert_eq!(registry.unblock("worker"), Ok(true));
        assert_eq!(registry.find("worker"), Some(QueueKind::SuspendedReady));
        assert_eq!(registry.unblock("worker"), Ok(false));

        assert_eq!(registry.block("worker"), Ok(true));
        assert_eq!(registry.find("worker"), Some(QueueKind::SuspendedBlocked));
        registry.verify().unwrap();
    }

    #[test]
    fn test_suspend_resume_report_outcome() {
        let (mut registry, mut heap) = setup();
        registry.create(&mut heap, "worker", ProcessClass::User, 3).unwrap();

        assert!(registry.suspend("worker"));
        assert!(!registry.suspend("worker"));
        assert_eq!(registry.find("worker"), Some(QueueKind::SuspendedReady));

        assert!(registry.resume("worker"));
        assert!(!registry.resume("worker"));
        assert!(!registry.resume("ghost"));
        assert_eq!(registry.find("worker"), Some(QueueKind::Ready));
    }

    #[test]
    fn test_resume_all_drains_both_queues() {
        let (mut registry, mut heap) = setup();
        for (name, priority) in [("aaa", 1), ("bbb", 7), ("ccc", 4), ("ddd", 2)] {
            registry.create(&mut heap, name, ProcessClass::User, priority).unwrap();
        }
        registry.block("ccc").unwrap();
        registry.block("ddd").unwrap();
        for name in ["aaa", "bbb", "ccc", "ddd"] {
            assert!(registry.suspend(name));
        }

        assert_eq!(registry.resume_all(), 4);
        assert_eq!(registry.queue_len(QueueKind::SuspendedReady), 0);
        assert_eq!(registry.queue_len(QueueKind::SuspendedBlocked), 0);
        assert_eq!(ready_names(&registry), ["bbb", "aaa"]);
        assert_eq!(registry.find("ccc"), Some(QueueKind::Blocked));
        registry.verify().unwrap();
    }

    #[test]
    fn test_set_priority_reorders_ready_only() {
        let (mut registry, mut heap) = setup();
        for (name, priority) in [("aaa", 5), ("bbb", 4), ("ccc", 3)] {
            registry.create(&mut heap, name, ProcessClass::User, priority).unwrap();
        }
        registry.set_priority("ccc", 9).unwrap();
        assert_eq!(ready_names(&registry), ["ccc", "aaa", "bbb"]);

        registry.block("aaa").unwrap();
        registry.block("bbb").unwrap();
        registry.set_priority("bbb", 9).unwrap();
        let blocked: Vec<String> = registry.show_blocked().into_iter().map(|i| i.name).collect();
        assert_eq!(blocked, ["aaa", "bbb"]);
        assert_eq!(registry.show("bbb").unwrap().priority, 9);

        assert_eq!(registry.set_priority("aaa", 12), Err(RegistryError::InvalidPriority(12)));
        registry.verify().unwrap();
    }

    #[test]
    fn test_load_starts_suspended_with_context() {
        let (mut registry, mut heap) = setup();
        let id = registry.load(&mut heap, "idle", ProcessClass::System, 0, 0x4000).unwrap();

        assert_eq!(registry.find("idle"), Some(QueueKind::SuspendedReady));
        let ctx = registry.context(id).unwrap();
        assert_eq!(ctx.eip, 0x4000);
        assert_eq!(ctx.eflags, Context::INITIAL_EFLAGS);
        assert_eq!(registry.is_system("idle"), Some(true));
    }

    #[test]
    fn test_running_process_is_in_no_queue() {
        let (mut registry, mut heap) = setup();
        registry.create(&mut heap, "solo", ProcessClass::User, 1).unwrap();
        let id = registry.take_ready_head().unwrap();

        assert_eq!(registry.get(id).unwrap().state(), ProcessState::Running);
        assert_eq!(registry.find("solo"), None);
        assert!(!registry.suspend("solo"));
        assert_eq!(registry.delete(&mut heap, "solo"), Err(RegistryError::Running("solo".into())));
        assert_eq!(registry.show_all()[0].state, ProcessState::Running);
        registry.verify().unwrap();

        registry.requeue_yielded(id).unwrap();
        assert_eq!(registry.find("solo"), Some(QueueKind::Ready));
        registry.verify().unwrap();
    }

    #[test]
    fn test_stale_handle_after_destroy() {
        let (mut registry, mut heap) = setup();
        let id = registry.create(&mut heap, "brief", ProcessClass::User, 1).unwrap();
        registry.destroy(&mut heap, id).unwrap();

        assert_eq!(registry.release(id), Err(RegistryError::StaleHandle));
        assert!(registry.get(id).is_none());
    }
}
