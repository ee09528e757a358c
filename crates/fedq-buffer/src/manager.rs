//! Shared registry of tuple sources.
//!
//! A tuple source is a FIFO of rows with a finished flag. Producers append
//! whole batches, consumers pop one row at a time; bytes are charged on
//! append and returned on pop or removal.

use std::collections::{HashMap, VecDeque};

use fedq_core::budget::{BudgetGuard, MemoryBudget};
use fedq_core::config::EngineConfig;
use fedq_core::id::{IdGenerator, TupleSourceId};
use fedq_core::types::{row_size, Row};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BufferError, Result};
use crate::guard::{BudgetReservation, BufferBudget};
use crate::tracking::PeakTracker;

struct TupleBuffer {
    label: String,
    rows: VecDeque<(Row, usize)>,
    finished: bool,
    rows_appended: u64,
    reservation: BudgetReservation,
}

/// Snapshot of one tuple source, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleSourceInfo {
    pub id: TupleSourceId,
    pub label: String,
    pub buffered_rows: usize,
    pub buffered_bytes: usize,
    pub rows_appended: u64,
    pub finished: bool,
}

pub struct BufferManager {
    budget: BufferBudget,
    ids: IdGenerator,
    sources: Mutex<HashMap<TupleSourceId, TupleBuffer>>,
    peak: PeakTracker,
}

impl BufferManager {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            budget: BufferBudget::new(capacity_bytes),
            ids: IdGenerator::new(),
            sources: Mutex::new(HashMap::new()),
            peak: PeakTracker::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.buffer_mem_cap_bytes)
    }

    /// Create an empty tuple source with a fresh id.
    pub fn create_tuple_source(&self, label: impl Into<String>) -> TupleSourceId {
        let id = self.ids.next_tuple_source();
        let label = label.into();
        debug!(%id, label = %label, "tuple source created");
        self.sources.lock().insert(
            id,
            TupleBuffer {
                label,
                rows: VecDeque::new(),
                finished: false,
                rows_appended: 0,
                reservation: self.budget.empty("tuple_source"),
            },
        );
        id
    }

    /// Append a batch. The batch is charged as a whole; if it does not fit,
    /// nothing is appended.
    pub fn append(&self, id: TupleSourceId, rows: Vec<Row>) -> Result<()> {
        let mut sources = self.sources.lock();
        let buffer = sources
            .get_mut(&id)
            .ok_or(BufferError::TupleSourceNotFound(id))?;
        if buffer.finished {
            return Err(BufferError::Finished(id));
        }
        let sized: Vec<(Row, usize)> = rows
            .into_iter()
            .map(|r| {
                let size = row_size(&r);
                (r, size)
            })
            .collect();
        let bytes: usize = sized.iter().map(|(_, s)| s).sum();
        if !buffer.reservation.try_grow(bytes) {
            return Err(BufferError::BudgetExceeded {
                tag: buffer.reservation.tag(),
                requested: bytes,
                capacity: self.budget.capacity_bytes(),
                used: self.budget.used_bytes(),
            });
        }
        buffer.rows_appended += sized.len() as u64;
        buffer.rows.extend(sized);
        self.peak.record_used(self.budget.used_bytes());
        Ok(())
    }

    /// No more rows will be appended.
    pub fn mark_finished(&self, id: TupleSourceId) -> Result<()> {
        let mut sources = self.sources.lock();
        let buffer = sources
            .get_mut(&id)
            .ok_or(BufferError::TupleSourceNotFound(id))?;
        buffer.finished = true;
        Ok(())
    }

    /// Pop the next buffered row, if any. `Ok(None)` does not mean the
    /// source is exhausted; check [`BufferManager::is_finished`].
    pub fn pop_row(&self, id: TupleSourceId) -> Result<Option<Row>> {
        let mut sources = self.sources.lock();
        let buffer = sources
            .get_mut(&id)
            .ok_or(BufferError::TupleSourceNotFound(id))?;
        Ok(buffer.rows.pop_front().map(|(row, size)| {
            buffer.reservation.shrink(size);
            row
        }))
    }

    /// Finished and fully drained.
    pub fn is_exhausted(&self, id: TupleSourceId) -> Result<bool> {
        let sources = self.sources.lock();
        let buffer = sources.get(&id).ok_or(BufferError::TupleSourceNotFound(id))?;
        Ok(buffer.finished && buffer.rows.is_empty())
    }

    pub fn is_finished(&self, id: TupleSourceId) -> Result<bool> {
        let sources = self.sources.lock();
        let buffer = sources.get(&id).ok_or(BufferError::TupleSourceNotFound(id))?;
        Ok(buffer.finished)
    }

    /// Release a tuple source and everything it still buffers.
    pub fn remove_tuple_source(&self, id: TupleSourceId) -> Result<()> {
        let removed = self
            .sources
            .lock()
            .remove(&id)
            .ok_or(BufferError::TupleSourceNotFound(id))?;
        debug!(
            %id,
            label = %removed.label,
            dropped_rows = removed.rows.len(),
            "tuple source removed"
        );
        Ok(())
    }

    pub fn contains(&self, id: TupleSourceId) -> bool {
        self.sources.lock().contains_key(&id)
    }

    pub fn info(&self, id: TupleSourceId) -> Result<TupleSourceInfo> {
        let sources = self.sources.lock();
        let b = sources.get(&id).ok_or(BufferError::TupleSourceNotFound(id))?;
        Ok(TupleSourceInfo {
            id,
            label: b.label.clone(),
            buffered_rows: b.rows.len(),
            buffered_bytes: b.reservation.bytes(),
            rows_appended: b.rows_appended,
            finished: b.finished,
        })
    }

    pub fn active_sources(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn used_bytes(&self) -> usize {
        self.budget.used_bytes()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.budget.capacity_bytes()
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak.peak()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_core::types::Scalar;

    fn rows(n: i32) -> Vec<Row> {
        (0..n).map(|i| vec![Scalar::I32(i), Scalar::Str(format!("r{}", i))]).collect()
    }

    #[test]
    fn fifo_and_exhaustion() {
        let mgr = BufferManager::new(1 << 20);
        let id = mgr.create_tuple_source("result");
        mgr.append(id, rows(2)).unwrap();
        assert!(!mgr.is_exhausted(id).unwrap());
        mgr.mark_finished(id).unwrap();
        assert_eq!(mgr.pop_row(id).unwrap().unwrap()[0], Scalar::I32(0));
        assert_eq!(mgr.pop_row(id).unwrap().unwrap()[0], Scalar::I32(1));
        assert!(mgr.pop_row(id).unwrap().is_none());
        assert!(mgr.is_exhausted(id).unwrap());
        assert_eq!(mgr.used_bytes(), 0);
        assert!(mgr.peak_bytes() > 0);
    }

    #[test]
    fn ids_are_unique() {
        let mgr = BufferManager::new(1024);
        let a = mgr.create_tuple_source("a");
        let b = mgr.create_tuple_source("b");
        assert_ne!(a, b);
        assert_eq!(mgr.active_sources(), 2);
    }

    #[test]
    fn removal_releases_budget_and_is_not_repeatable() {
        let mgr = BufferManager::new(1 << 20);
        let id = mgr.create_tuple_source("result");
        mgr.append(id, rows(10)).unwrap();
        assert!(mgr.used_bytes() > 0);
        mgr.remove_tuple_source(id).unwrap();
        assert_eq!(mgr.used_bytes(), 0);
        assert!(matches!(
            mgr.remove_tuple_source(id),
            Err(BufferError::TupleSourceNotFound(_))
        ));
    }

    #[test]
    fn over_budget_batch_is_rejected_whole() {
        let mgr = BufferManager::new(64);
        let id = mgr.create_tuple_source("small");
        let err = mgr.append(id, rows(100)).unwrap_err();
        assert!(matches!(err, BufferError::BudgetExceeded { .. }));
        assert_eq!(mgr.info(id).unwrap().buffered_rows, 0);
    }

    #[test]
    fn finished_sources_reject_appends() {
        let mgr = BufferManager::new(1024);
        let id = mgr.create_tuple_source("x");
        mgr.mark_finished(id).unwrap();
        assert!(matches!(mgr.append(id, rows(1)), Err(BufferError::Finished(_))));
    }
}
