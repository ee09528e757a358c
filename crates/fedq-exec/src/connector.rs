//! The seam between the engine and the systems that hold data.

use std::task::Poll;

use fedq_core::types::Row;
use fedq_lang::Command;
use fedq_meta::MetadataStore;
use fedq_planner::SourceCapabilities;

use crate::context::ExecutionContext;
use crate::error::Result;

/// A data source bound to one or more physical models.
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    /// What the source can evaluate; drives push-down during planning.
    fn capabilities(&self) -> SourceCapabilities;

    /// Start running `command`. Rows are pulled from the returned execution.
    fn execute(
        &self,
        command: &Command,
        context: &ExecutionContext,
        store: &MetadataStore,
    ) -> Result<Box<dyn SourceExecution>>;
}

/// One running source request.
///
/// `next` returns `Poll::Pending` when no row is available yet; the caller
/// retries later and the execution must resume where it stopped.
/// `Poll::Ready(Ok(None))` ends the stream.
pub trait SourceExecution: Send {
    fn next(&mut self) -> Poll<Result<Option<Row>>>;

    fn close(&mut self) {}
}
