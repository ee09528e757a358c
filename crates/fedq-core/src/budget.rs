//! Byte accounting interfaces shared by crates that hold rows.
//!
//! `fedq-buffer` provides the implementation; the traits sit here so a crate
//! can charge memory without depending on the buffer manager.

/// Bytes charged to a budget; returned when the guard drops.
pub trait BudgetGuard: Send {
    fn bytes(&self) -> usize;

    /// Label used in budget errors and traces.
    fn tag(&self) -> &'static str {
        "unlabelled"
    }
}

/// A fixed capacity that reservations are charged against.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Charge `bytes`, or `None` when the capacity would be passed.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    fn capacity_bytes(&self) -> usize;

    /// Bytes currently charged across all guards.
    fn used_bytes(&self) -> usize;
}
