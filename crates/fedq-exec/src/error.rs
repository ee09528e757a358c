use fedq_buffer::BufferError;
use fedq_lang::ParseError;
use fedq_meta::MetaError;
use fedq_planner::PlannerError;
use thiserror::Error;

/// Result type local to fedq-exec.
pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("no value bound for reference '{0}'")]
    MissingBinding(String),

    #[error("row limit {limit} passed for result set '{result_set}'")]
    RowLimitExceeded { limit: u64, result_set: String },

    #[error("result set '{result_set}': {message}")]
    Component { result_set: String, message: String },

    #[error("tuple source for result set '{0}' not found")]
    TupleSourceNotFound(String),

    #[error("source '{model}': {message}")]
    Source { model: String, message: String },

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("VDB failed validation:\n{0}")]
    Validation(String),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Core(#[from] fedq_core::error::Error),
}

impl ExecError {
    pub fn source_failure(model: impl Into<String>, message: impl Into<String>) -> Self {
        ExecError::Source {
            model: model.into(),
            message: message.into(),
        }
    }
}
