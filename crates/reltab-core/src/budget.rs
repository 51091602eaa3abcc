//! Byte-budget interfaces for buffering operators.
//!
//! The concrete budget lives in `reltab-mem`. Only the traits live here so
//! operators can be written against them without pulling in spill logic.

/// A reservation of bytes against a budget. Dropping it returns the bytes.
pub trait BudgetGuard: Send {
    /// Bytes currently held by this guard.
    fn bytes(&self) -> usize;

    /// Grow or shrink the reservation to `new_bytes`. Shrinking always
    /// succeeds; growing fails (leaving the guard unchanged) when the budget
    /// cannot cover the difference.
    fn try_resize(&mut self, new_bytes: usize) -> bool;

    /// Debug tag for tracing.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A hard cap on bytes buffered at once.
///
/// Callers reserve before they buffer. When a reservation fails they must
/// flush (spill) what they hold instead of buffering more.
pub trait MemoryBudget: Send + Sync {
    type Guard: BudgetGuard;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    fn capacity_bytes(&self) -> usize;

    /// Advisory; not a correctness API.
    fn used_bytes(&self) -> usize;
}
