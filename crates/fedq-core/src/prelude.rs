//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::context::WorkContext;
pub use crate::error::{Error, Result};
pub use crate::id::{IdGenerator, NodeId, RequestId, TupleSourceId};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{Row, Scalar};
