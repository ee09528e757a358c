#![forbid(unsafe_code)]
//! fedq-exec: running physical programs against connectors.
//!
//! A [`RelationalPlanExecutor`] instantiates the processing nodes of a
//! program, pulls rows through them in batches with a [`QueryProcessor`] and
//! stages them in a tuple source owned by the shared buffer manager. Sources
//! that are not ready answer `Poll::Pending`; the signal travels up unchanged
//! and every pull can be retried.

pub mod connector;
pub mod context;
pub mod data_manager;
pub mod engine;
pub mod error;
pub mod eval;
pub mod executor;
pub mod memory;
pub mod node;
pub mod processor;

pub use connector::{Connector, SourceExecution};
pub use context::{Bindings, CommandContext, ExecutionContext};
pub use data_manager::DataManager;
pub use engine::Engine;
pub use error::{ExecError, Result};
pub use executor::{RelationalPlanExecutor, ResultSetInfo};
pub use memory::MemoryConnector;
pub use node::{NodeContext, ProcessingNode};
pub use processor::{ProcessorBatch, QueryProcessor};
