use fedq_meta::MetaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlannerError>;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// A rule keeps reporting changes; the plan never settles.
    #[error("optimizer rule cycle: {iterations} rule executions without reaching a fixed point (last rule {last_rule})")]
    RuleCycle {
        iterations: usize,
        last_rule: &'static str,
    },

    #[error("plan invariant violated: {0}")]
    Invariant(String),

    #[error("resolution failed: {0}")]
    Resolve(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Meta(#[from] MetaError),
}
