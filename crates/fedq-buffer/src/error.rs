use fedq_core::id::TupleSourceId;
use thiserror::Error;

/// Result type local to fedq-buffer.
pub type Result<T> = std::result::Result<T, BufferError>;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("tuple source {0} not found")]
    TupleSourceNotFound(TupleSourceId),

    #[error("buffer budget exceeded for '{tag}': requested {requested} bytes, capacity {capacity}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("tuple source {0} is already finished")]
    Finished(TupleSourceId),
}
