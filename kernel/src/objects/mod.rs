//! Kernel objects

pub mod pcb;

pub use pcb::{
    Pcb, ProcessClass, ProcessId, ProcessState, MAX_PRIORITY, NAME_MAX, NAME_MIN, PCB_RECORD_BYTES,
    STACK_SIZE,
};
