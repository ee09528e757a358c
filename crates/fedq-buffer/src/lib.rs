#![forbid(unsafe_code)]
//! fedq-buffer: the buffer manager.
//!
//! Rows produced by a query are staged in uniquely identified tuple sources
//! owned by a shared [`BufferManager`]. Every buffered row is charged to a
//! hard byte budget ([`BufferBudget`]) and released as it is consumed, so the
//! total held across all executions never passes the configured cap.

pub mod error;
pub mod guard;
pub mod manager;
pub mod tracking;

pub use error::{BufferError, Result};
pub use guard::{BudgetReservation, BufferBudget};
pub use manager::{BufferManager, TupleSourceInfo};
pub use tracking::PeakTracker;
