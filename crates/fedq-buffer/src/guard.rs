//! The byte cap shared by all tuple sources of one buffer manager.
//!
//! Bytes are handed back when a [`BudgetReservation`] drops, so a source that
//! is removed early, or an execution that unwinds, leaves the pool whole.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fedq_core::budget::{BudgetGuard, MemoryBudget};

#[derive(Debug)]
struct Pool {
    cap: usize,
    charged: AtomicUsize,
}

impl Pool {
    fn charge(&self, bytes: usize) -> bool {
        self.charged
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |charged| {
                charged.checked_add(bytes).filter(|total| *total <= self.cap)
            })
            .is_ok()
    }

    fn refund(&self, bytes: usize) {
        self.charged.fetch_sub(bytes, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct BufferBudget {
    pool: Arc<Pool>,
}

impl BufferBudget {
    pub fn new(capacity_bytes: usize) -> Self {
        let pool = Pool {
            cap: capacity_bytes,
            charged: AtomicUsize::new(0),
        };
        Self { pool: Arc::new(pool) }
    }

    /// A zero-byte reservation for a source that fills up over time.
    pub fn empty(&self, tag: &'static str) -> BudgetReservation {
        BudgetReservation {
            pool: self.pool.clone(),
            held: 0,
            tag,
        }
    }
}

/// Bytes charged on behalf of one tuple source.
#[derive(Debug)]
pub struct BudgetReservation {
    pool: Arc<Pool>,
    held: usize,
    tag: &'static str,
}

impl BudgetReservation {
    /// Charge `bytes` more. Nothing changes when the cap would be passed.
    pub fn try_grow(&mut self, bytes: usize) -> bool {
        let granted = bytes == 0 || self.pool.charge(bytes);
        if granted {
            self.held += bytes;
        }
        granted
    }

    /// Refund up to `bytes`; never below zero.
    pub fn shrink(&mut self, bytes: usize) {
        let refund = self.held.min(bytes);
        self.held -= refund;
        if refund != 0 {
            self.pool.refund(refund);
        }
    }
}

impl Drop for BudgetReservation {
    fn drop(&mut self) {
        let held = std::mem::take(&mut self.held);
        if held != 0 {
            self.pool.refund(held);
        }
    }
}

impl BudgetGuard for BudgetReservation {
    fn bytes(&self) -> usize {
        self.held
    }

    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl MemoryBudget for BufferBudget {
    type Guard = BudgetReservation;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<BudgetReservation> {
        let mut reservation = self.empty(tag);
        if reservation.try_grow(bytes) {
            Some(reservation)
        } else {
            None
        }
    }

    fn capacity_bytes(&self) -> usize {
        self.pool.cap
    }

    fn used_bytes(&self) -> usize {
        self.pool.charged.load(Ordering::Acquire)
    }
}
