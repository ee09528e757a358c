#![forbid(unsafe_code)]
//! fedq: a federated query engine core.
//!
//! The workspace crates, re-exported under one roof:
//! - [`fedq_core`]: ids, scalars, schemas, configuration, work context
//! - [`fedq_lang`]: the language object tree, parser and visitors
//! - [`fedq_meta`]: DDL factory, metadata store, validator, VDB descriptors
//! - [`fedq_buffer`]: the buffer manager and its tuple sources
//! - [`fedq_planner`]: plan generation, rule-based optimizer, lowering
//! - [`fedq_exec`]: connectors, processing nodes, the relational plan executor

pub use fedq_buffer;
pub use fedq_core;
pub use fedq_exec;
pub use fedq_lang;
pub use fedq_meta;
pub use fedq_planner;

pub mod prelude {
    pub use fedq_core::prelude::*;
    pub use fedq_exec::{Bindings, Engine, ExecError, RelationalPlanExecutor, ResultSetInfo};
    pub use fedq_lang::QueryParser;
    pub use fedq_meta::{MetadataStore, VdbMetaData};
}
