#![forbid(unsafe_code)]
//! fedq-planner: from a resolved query to a physical program.
//!
//! Pipeline:
//! - `generate`: canonical plan tree (arena, `PlanNodeId` links), views and
//!   inline views expanded beneath `Source` nodes
//! - `rules`: rule stack driven optimizer (access placement, criteria
//!   cleanup, select push-down, outer-to-inner join, access raising)
//! - `lower`: optimized tree to a `PhysicalProgram` whose `Access` nodes
//!   carry the command pushed to each source

pub mod capabilities;
pub mod cost;
pub mod criteria;
pub mod error;
pub mod generate;
pub mod lower;
pub mod physical;
pub mod plan;
pub mod planner;
pub mod rules;

pub use capabilities::{CapabilitiesFinder, SourceCapabilities, StaticCapabilities};
pub use criteria::{elements_in_criteria, required_elements_in_criteria};
pub use error::{PlannerError, Result};
pub use generate::PlanGenerator;
pub use lower::lower_to_physical;
pub use physical::{PhysicalNode, PhysicalProgram};
pub use plan::{NodeKind, PlanNode, PlanNodeId, PlanTree};
pub use planner::{PlanResult, RelationalPlanner};
pub use rules::{Optimizer, OptimizerRule, OptimizerStats, RuleContext, RuleKind, RuleStack};
