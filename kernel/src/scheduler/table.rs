//! Process arena
//!
//! Owns every live PCB. Queues never hold PCBs, only slot indices into this
//! table; the link fields live next to the PCB in its slot.

use core::ops::{Index, IndexMut};

use crate::objects::{Pcb, ProcessId};

/// A PCB plus its queue links
pub(crate) struct Node {
    pub pcb: Pcb,
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub(crate) struct ProcessTable {
    slots: Vec<Slot>,
    vacant: Vec<usize>,
    len: usize,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn insert(&mut self, pcb: Pcb) -> ProcessId {
        let node = Node {
            pcb,
            next: None,
            prev: None,
        };
        self.len += 1;

        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return ProcessId {
                index: index as u32,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        ProcessId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Take a PCB out of the table; its slot's generation moves on.
    pub fn remove(&mut self, id: ProcessId) -> Option<Pcb> {
        let index = self.resolve(id)?;
        let slot = &mut self.slots[index];
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(index);
        self.len -= 1;
        Some(node.pcb)
    }

    /// Slot index of a live handle
    pub fn resolve(&self, id: ProcessId) -> Option<usize> {
        let index = id.index as usize;
        let slot = self.slots.get(index)?;
        (slot.generation == id.generation && slot.node.is_some()).then_some(index)
    }

    /// Handle for an occupied slot
    pub fn id_at(&self, index: usize) -> ProcessId {
        ProcessId {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.slots.get(index)?.node.as_ref()
    }

    /// Slot of the live process called `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.iter().find(|(_, node)| node.pcb.name() == name).map(|(index, _)| index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.node.as_ref().map(|node| (index, node)))
    }
}

impl Index<usize> for ProcessTable {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        match self.slots[index].node.as_ref() {
            Some(node) => node,
            None => panic!("process slot {} is vacant but still linked", index),
        }
    }
}

impl IndexMut<usize> for ProcessTable {
    fn index_mut(&mut self, index: usize) -> &mut Node {
        match self.slots[index].node.as_mut() {
            Some(node) => node,
            None => panic!("process slot {} is vacant but still linked", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ProcessClass;

    fn pcb(name: &str) -> Pcb {
        Pcb::new(name, ProcessClass::User, 1, 0)
    }

    #[test]
    fn test_stale_handles_do_not_resolve() {
        let mut table = ProcessTable::new();
        let first = table.insert(pcb("one"));
        assert!(table.remove(first).is_some());

        let second = table.insert(pcb("two"));
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert_eq!(table.resolve(first), None);
        assert_eq!(table.resolve(second), Some(second.index as usize));
        assert!(table.remove(first).is_none());
    }

    #[test]
    fn test_position_by_name() {
        let mut table = ProcessTable::new();
        table.insert(pcb("one"));
        let two = table.insert(pcb("two"));
        assert_eq!(table.position("two"), Some(two.index as usize));
        assert_eq!(table.position("three"), None);
        assert_eq!(table.len(), 2);
    }
}
