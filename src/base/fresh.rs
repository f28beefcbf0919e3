//! Monotonic id source shared by variable renaming and skolemization.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out process-unique `u64` ids. Cloneable handles share the counter.
#[derive(Debug, Default)]
pub struct FreshIds {
    next: AtomicU64,
}

impl FreshIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused id. Never returns the same value twice for one counter.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
