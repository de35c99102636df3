//! Completion event flag
//!
//! One flag is shared by the driver (which raises it from interrupt context
//! when a transfer finishes) and the I/O scheduler (which polls it on every
//! trap). Cloning shares the same flag.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FlagState {
    value: AtomicU32,
    raised: AtomicU64,
}

/// Shared 0/1 completion flag
#[derive(Debug, Clone, Default)]
pub struct EventFlag {
    state: Arc<FlagState>,
}

impl EventFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn set(&self) {
        self.state.value.store(1, Ordering::Release);
        self.state.raised.fetch_add(1, Ordering::Relaxed);
    }

    /// Lower the flag
    pub fn clear(&self) {
        self.state.value.store(0, Ordering::Release);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.value.load(Ordering::Acquire) != 0
    }

    /// Number of times the flag has been raised since creation
    #[inline]
    pub fn times_raised(&self) -> u64 {
        self.state.raised.load(Ordering::Relaxed)
    }

    /// True when both handles refer to the same flag
    pub fn same_as(&self, other: &EventFlag) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}
