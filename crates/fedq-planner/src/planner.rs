//! Facade: resolved query in, executable program out.

use fedq_core::schema::{DataType, Field};
use fedq_lang::{Query, ReferenceCollectorVisitor, SelectSymbol};
use fedq_meta::MetadataStore;
use tracing::debug;

use crate::capabilities::CapabilitiesFinder;
use crate::error::Result;
use crate::generate::PlanGenerator;
use crate::lower::lower_to_physical;
use crate::physical::PhysicalProgram;
use crate::plan::PlanTree;
use crate::rules::{Optimizer, OptimizerStats, RuleContext};

#[derive(Debug, Clone)]
pub struct PlanResult {
    /// Optimized relational plan.
    pub tree: PlanTree,
    pub program: PhysicalProgram,
    pub stats: OptimizerStats,
}

pub struct RelationalPlanner<'a> {
    store: &'a MetadataStore,
    capabilities: &'a dyn CapabilitiesFinder,
    max_iterations: usize,
}

impl<'a> RelationalPlanner<'a> {
    pub fn new(store: &'a MetadataStore, capabilities: &'a dyn CapabilitiesFinder) -> Self {
        Self {
            store,
            capabilities,
            max_iterations: Optimizer::DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Plan a query that has already been resolved against the store.
    pub fn plan(&self, query: &Query) -> Result<PlanResult> {
        let mut tree = PlanGenerator::new(self.store).generate(query)?;
        let ctx = RuleContext {
            store: self.store,
            capabilities: self.capabilities,
        };
        let stats = Optimizer::new(self.max_iterations).optimize(&mut tree, &ctx)?;
        let root = lower_to_physical(&tree)?;

        let fields = query
            .select
            .symbols
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                SelectSymbol::Expression(e) => Some(Field::new(
                    e.output_name(i),
                    e.expression.data_type().unwrap_or(DataType::Object),
                    true,
                )),
                SelectSymbol::All(_) => None,
            })
            .collect();
        let mut references = ReferenceCollectorVisitor::get_references(query);
        references.dedup();

        debug!(
            nodes = tree.len(),
            rules = stats.iterations(),
            references = references.len(),
            "query planned"
        );
        Ok(PlanResult {
            tree,
            program: PhysicalProgram {
                root,
                fields,
                references,
            },
            stats,
        })
    }
}
