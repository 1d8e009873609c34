//! Batch-wide UUID deduplication.
//!
//! The seen-set is the one piece of truly shared mutable state in the
//! pipeline. The critical section covers only the check-and-insert; it never
//! wraps file I/O or parsing.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Tracks the fiscal UUIDs accepted so far in one run. A fresh registry is
/// created per batch; it is shared across all workers behind an `Arc`.
#[derive(Debug, Default)]
pub struct UuidRegistry {
    seen: Mutex<HashSet<String>>,
}

impl UuidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check-and-insert: `true` on first occurrence, `false` on
    /// every repeat. Two workers can never both observe "not present" for the
    /// same uuid because the insert happens under the same lock as the check.
    pub fn admit(&self, uuid: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uuid.to_string())
    }

    /// Number of distinct uuids admitted so far.
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
