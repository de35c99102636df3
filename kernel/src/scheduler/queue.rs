//! Process queues
//!
//! Intrusive doubly-linked lists threaded through the process table. A
//! queue stores only its head, tail and count; the links live in the
//! table's nodes. Every PCB is linked into at most one queue, and unlinking
//! clears its links.
//!
//! Two disciplines exist:
//! - **Priority**: ordered by dispatch round, then priority (highest
//!   first); equal keys keep arrival order.
//! - **FIFO**: arrival order.

use super::table::ProcessTable;
use super::RegistryError;
use crate::objects::{Pcb, ProcessState};

/// The four process queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Ready,
    Blocked,
    SuspendedReady,
    SuspendedBlocked,
}

/// Insertion discipline of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    Priority,
    Fifo,
}

impl QueueKind {
    /// Lookup order used when searching for a process
    pub const SEARCH_ORDER: [QueueKind; 4] = [
        QueueKind::Ready,
        QueueKind::Blocked,
        QueueKind::SuspendedReady,
        QueueKind::SuspendedBlocked,
    ];

    pub fn discipline(self) -> Discipline {
        match self {
            QueueKind::Ready | QueueKind::SuspendedReady => Discipline::Priority,
            QueueKind::Blocked | QueueKind::SuspendedBlocked => Discipline::Fifo,
        }
    }

    /// State of every process held in this queue
    pub fn state(self) -> ProcessState {
        match self {
            QueueKind::Ready => ProcessState::Ready,
            QueueKind::Blocked => ProcessState::Blocked,
            QueueKind::SuspendedReady => ProcessState::ReadySuspended,
            QueueKind::SuspendedBlocked => ProcessState::BlockedSuspended,
        }
    }

    /// Queue that holds processes in `state`; `None` for `Running`
    pub fn for_state(state: ProcessState) -> Option<Self> {
        match state {
            ProcessState::Ready => Some(QueueKind::Ready),
            ProcessState::Blocked => Some(QueueKind::Blocked),
            ProcessState::ReadySuspended => Some(QueueKind::SuspendedReady),
            ProcessState::BlockedSuspended => Some(QueueKind::SuspendedBlocked),
            ProcessState::Running => None,
        }
    }
}

/// True when `a` must be dispatched ahead of `b`
#[inline]
fn runs_before(a: &Pcb, b: &Pcb) -> bool {
    (a.epoch, core::cmp::Reverse(a.priority())) < (b.epoch, core::cmp::Reverse(b.priority()))
}

/// Head/tail/count of one intrusive list
#[derive(Debug)]
pub struct ProcessQueue {
    kind: QueueKind,
    head: Option<usize>,
    tail: Option<usize>,
    count: usize,
}

impl ProcessQueue {
    pub const fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            head: None,
            tail: None,
            count: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<usize> {
        self.head
    }

    /// Link `index` according to the queue's discipline.
    pub(crate) fn enqueue(&mut self, table: &mut ProcessTable, index: usize) {
        match self.kind.discipline() {
            Discipline::Fifo => self.link_before(table, index, None),
            Discipline::Priority => {
                // First node the newcomer strictly outranks; ties stay behind
                let mut cursor = self.head;
                while let Some(node) = cursor {
                    if runs_before(&table[index].pcb, &table[node].pcb) {
                        break;
                    }
                    cursor = table[node].next;
                }
                self.link_before(table, index, cursor);
            }
        }
    }

    /// Insert `index` ahead of `successor` (or at the tail when `None`)
    fn link_before(&mut self, table: &mut ProcessTable, index: usize, successor: Option<usize>) {
        let prev = match successor {
            Some(next) => table[next].prev,
            None => self.tail,
        };

        table[index].next = successor;
        table[index].prev = prev;

        match prev {
            Some(p) => table[p].next = Some(index),
            None => self.head = Some(index),
        }
        match successor {
            Some(n) => table[n].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.count += 1;
    }

    /// Unlink `index` from this queue and clear its links.
    pub(crate) fn remove(&mut self, table: &mut ProcessTable, index: usize) {
        let next = table[index].next;
        let prev = table[index].prev;

        match prev {
            Some(p) => table[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => table[n].prev = prev,
            None => self.tail = prev,
        }

        table[index].next = None;
        table[index].prev = None;
        self.count -= 1;
    }

    pub(crate) fn pop_front(&mut self, table: &mut ProcessTable) -> Option<usize> {
        let head = self.head?;
        self.remove(table, head);
        Some(head)
    }

    /// Slot indices from head to tail
    pub(crate) fn indices(&self, table: &ProcessTable) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.count);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            out.push(index);
            cursor = table[index].next;
        }
        out
    }

    /// Walk the list both ways checking links, count, order and states.
    pub(crate) fn verify(&self, table: &ProcessTable) -> Result<Vec<usize>, RegistryError> {
        let corrupt = |reason| RegistryError::Corrupt { queue: self.kind, reason };

        let mut forward = Vec::with_capacity(self.count);
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            if forward.len() > self.count {
                return Err(corrupt("forward walk exceeds count"));
            }
            let node = table.get(index).ok_or_else(|| corrupt("link to vacant slot"))?;
            if node.prev != prev {
                return Err(corrupt("back link mismatch"));
            }
            if node.pcb.state() != self.kind.state() {
                return Err(corrupt("member state does not match queue"));
            }
            if let (Some(p), Discipline::Priority) = (prev, self.kind.discipline()) {
                if runs_before(&node.pcb, &table[p].pcb) {
                    return Err(corrupt("priority order violated"));
                }
            }
            forward.push(index);
            prev = Some(index);
            cursor = node.next;
        }

        if forward.len() != self.count {
            return Err(corrupt("count does not match members"));
        }
        if self.tail != prev {
            return Err(corrupt("tail does not match last member"));
        }

        let mut backward = Vec::with_capacity(self.count);
        let mut cursor = self.tail;
        while let Some(index) = cursor {
            if backward.len() > self.count {
                return Err(corrupt("backward walk exceeds count"));
            }
            backward.push(index);
            cursor = table[index].prev;
        }
        backward.reverse();
        if backward != forward {
            return Err(corrupt("forward and backward walks disagree"));
        }

        Ok(forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ProcessClass;

    fn add(table: &mut ProcessTable, name: &str, priority: u8, state: ProcessState) -> usize {
        let mut pcb = Pcb::new(name, ProcessClass::User, priority, 0);
        pcb.set_state(state);
        table.insert(pcb).index as usize
    }

    fn names(queue: &ProcessQueue, table: &ProcessTable) -> Vec<String> {
        queue
            .indices(table)
            .into_iter()
            .map(|i| table[i].pcb.name().to_string())
            .collect()
    }

    #[test]
    fn test_priority_order_is_stable() {
        let mut table = ProcessTable::new();
        let mut ready = ProcessQueue::new(QueueKind::Ready);

        for (name, priority) in [("a5", 5), ("b9", 9), ("c5", 5), ("d2", 2), ("e9", 9), ("f0", 0)] {
            let index = add(&mut table, name, priority, ProcessState::Ready);
            ready.enqueue(&mut table, index);
        }

        assert_eq!(names(&ready, &table), ["b9", "e9", "a5", "c5", "d2", "f0"]);
        ready.verify(&table).unwrap();
    }

    #[test]
    fn test_fifo_order() {
        let mut table = ProcessTable::new();
        let mut blocked = ProcessQueue::new(QueueKind::Blocked);

        for (name, priority) in [("low", 1), ("high", 9), ("mid", 5)] {
            let index = add(&mut table, name, priority, ProcessState::Blocked);
            blocked.enqueue(&mut table, index);
        }

        assert_eq!(names(&blocked, &table), ["low", "high", "mid"]);
        blocked.verify(&table).unwrap();
    }

    #[test]
    fn test_remove_clears_links() {
        let mut table = ProcessTable::new();
        let mut ready = ProcessQueue::new(QueueKind::Ready);
        let ids: Vec<usize> = (0..3)
            .map(|i| {
                let index = add(&mut table, &format!("p{i}"), 3, ProcessState::Ready);
                ready.enqueue(&mut table, index);
                index
            })
            .collect();

        ready.remove(&mut table, ids[1]);
        assert_eq!(table[ids[1]].next, None);
        assert_eq!(table[ids[1]].prev, None);
        assert_eq!(names(&ready, &table), ["p0", "p2"]);

        assert_eq!(ready.pop_front(&mut table), Some(ids[0]));
        assert_eq!(ready.pop_front(&mut table), Some(ids[2]));
        assert_eq!(ready.pop_front(&mut table), None);
        assert!(ready.is_empty());
        ready.verify(&table).unwrap();
    }

    #[test]
    fn test_later_round_queues_behind() {
        let mut table = ProcessTable::new();
        let mut ready = ProcessQueue::new(QueueKind::Ready);

        let high = add(&mut table, "high", 9, ProcessState::Ready);
        table[high].pcb.epoch = 1;
        ready.enqueue(&mut table, high);

        let low = add(&mut table, "low", 1, ProcessState::Ready);
        ready.enqueue(&mut table, low);

        assert_eq!(names(&ready, &table), ["low", "high"]);
    }

    #[test]
    fn test_verify_rejects_wrong_state() {
        let mut table = ProcessTable::new();
        let mut ready = ProcessQueue::new(QueueKind::Ready);
        let index = add(&mut table, "odd", 1, ProcessState::Blocked);
        ready.enqueue(&mut table, index);

        assert!(matches!(ready.verify(&table), Err(RegistryError::Corrupt { .. })));
    }
}
