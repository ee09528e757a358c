#![forbid(unsafe_code)]
//! fedq-core: shared vocabulary for the federated query engine.
//!
//! Everything here is plain data: ids, scalar values and rows, runtime
//! datatypes, output schemas, the work context carried by each request, the
//! engine configuration and the memory-budget traits implemented by
//! `fedq-buffer`. No planning or execution logic lives in this crate.

pub mod budget;
pub mod config;
pub mod context;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod types;

/// Crate version, stamped into explain output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
