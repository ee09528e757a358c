//! Rule-stack optimizer.
//!
//! Rules are popped off a stack and applied to the whole tree. A rule that
//! changed the plan pushes the rules that may now find more work (its
//! dependents) unless they are already queued. The run ends when the stack
//! is empty; a fixed ceiling on executions turns a rule cycle into an error.

use std::collections::HashMap;
use std::fmt;

use fedq_meta::MetadataStore;
use serde::Serialize;
use tracing::{debug, trace};

use crate::capabilities::CapabilitiesFinder;
use crate::error::{PlannerError, Result};
use crate::plan::PlanTree;

mod clean_criteria;
mod combine_selects;
mod outer_to_inner;
mod place_access;
mod push_select_criteria;
mod raise_access;

pub use clean_criteria::CleanCriteria;
pub use combine_selects::CombineSelects;
pub use outer_to_inner::OuterToInnerJoin;
pub use place_access::PlaceAccess;
pub use push_select_criteria::PushSelectCriteria;
pub use raise_access::RaiseAccess;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RuleKind {
    PlaceAccess,
    CleanCriteria,
    PushSelectCriteria,
    OuterToInnerJoin,
    RaiseAccess,
    CombineSelects,
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::PlaceAccess => "PlaceAccess",
            RuleKind::CleanCriteria => "CleanCriteria",
            RuleKind::PushSelectCriteria => "PushSelectCriteria",
            RuleKind::OuterToInnerJoin => "OuterToInnerJoin",
            RuleKind::RaiseAccess => "RaiseAccess",
            RuleKind::CombineSelects => "CombineSelects",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What rules may consult while rewriting.
pub struct RuleContext<'a> {
    pub store: &'a MetadataStore,
    pub capabilities: &'a dyn CapabilitiesFinder,
}

/// Pending rules; the last pushed runs next.
#[derive(Debug, Clone, Default)]
pub struct RuleStack {
    rules: Vec<RuleKind>,
}

impl RuleStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: RuleKind) {
        self.rules.push(rule);
    }

    pub fn pop(&mut self) -> Option<RuleKind> {
        self.rules.pop()
    }

    pub fn contains(&self, rule: RuleKind) -> bool {
        self.rules.contains(&rule)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

pub trait OptimizerRule: Send + Sync {
    fn kind(&self) -> RuleKind;

    /// Rules to queue again after this one changed the plan.
    fn dependents(&self) -> &'static [RuleKind] {
        &[]
    }

    /// Rewrite `tree` in place; returns whether anything changed. Rules may
    /// also push follow-up work onto `stack` directly.
    fn execute(&self, tree: &mut PlanTree, ctx: &RuleContext<'_>, stack: &mut RuleStack) -> Result<bool>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizerStats {
    /// Rule executions, in order.
    pub executed: Vec<RuleKind>,
    /// Executions that changed the plan.
    pub changed: usize,
}

impl OptimizerStats {
    pub fn iterations(&self) -> usize {
        self.executed.len()
    }
}

pub struct Optimizer {
    rules: HashMap<RuleKind, Box<dyn OptimizerRule>>,
    initial: Vec<RuleKind>,
    max_iterations: usize,
}

impl Optimizer {
    pub const DEFAULT_MAX_ITERATIONS: usize = 1_000;

    /// The standard rule set, run in this initial order.
    pub fn new(max_iterations: usize) -> Self {
        Self::with_rules(
            vec![
                Box::new(PlaceAccess),
                Box::new(CleanCriteria),
                Box::new(PushSelectCriteria),
                Box::new(OuterToInnerJoin),
                Box::new(RaiseAccess),
                Box::new(CombineSelects),
            ],
            max_iterations,
        )
    }

    /// A custom rule set; the initial order is the order given.
    pub fn with_rules(rules: Vec<Box<dyn OptimizerRule>>, max_iterations: usize) -> Self {
        let initial = rules.iter().map(|r| r.kind()).collect();
        let rules = rules.into_iter().map(|r| (r.kind(), r)).collect();
        Self {
            rules,
            initial,
            max_iterations,
        }
    }

    pub fn optimize(&self, tree: &mut PlanTree, ctx: &RuleContext<'_>) -> Result<OptimizerStats> {
        let mut stack = RuleStack::new();
        for &kind in self.initial.iter().rev() {
            stack.push(kind);
        }
        let mut stats = OptimizerStats::default();

        while let Some(kind) = stack.pop() {
            if stats.executed.len() >= self.max_iterations {
                return Err(PlannerError::RuleCycle {
                    iterations: stats.executed.len(),
                    last_rule: kind.name(),
                });
            }
            let Some(rule) = self.rules.get(&kind) else {
                continue;
            };
            stats.executed.push(kind);
            let changed = rule.execute(tree, ctx, &mut stack)?;
            trace!(rule = kind.name(), changed, "rule executed");
            if changed {
                stats.changed += 1;
                for &dep in rule.dependents() {
                    if !stack.contains(dep) {
                        stack.push(dep);
                    }
                }
            }
        }

        debug!(
            iterations = stats.iterations(),
            changed = stats.changed,
            "optimizer finished"
        );
        Ok(stats)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ITERATIONS)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capabilities::{SourceCapabilities, StaticCapabilities};
    use crate::generate::tests::{resolved, store};
    use crate::generate::PlanGenerator;

    /// Always reports a change and depends on itself.
    struct Spinner;

    impl OptimizerRule for Spinner {
        fn kind(&self) -> RuleKind {
            RuleKind::CombineSelects
        }

        fn dependents(&self) -> &'static [RuleKind] {
            &[RuleKind::CombineSelects]
        }

        fn execute(&self, _: &mut PlanTree, _: &RuleContext<'_>, _: &mut RuleStack) -> Result<bool> {
            Ok(true)
        }
    }

    /// Generate and optimize `sql`, returning the explain text.
    pub(crate) fn optimized(sql: &str, caps: &StaticCapabilities) -> PlanTree {
        let store = store();
        let q = resolved(&store, sql);
        let mut tree = PlanGenerator::new(&store).generate(&q).unwrap();
        let ctx = RuleContext {
            store: &store,
            capabilities: caps,
        };
        Optimizer::default().optimize(&mut tree, &ctx).unwrap();
        tree
    }

    #[test]
    fn rule_cycle_hits_the_ceiling() {
        let store = store();
        let caps = StaticCapabilities::new(SourceCapabilities::basic());
        let ctx = RuleContext {
            store: &store,
            capabilities: &caps,
        };
        let mut tree = PlanTree::new();
        let optimizer = Optimizer::with_rules(vec![Box::new(Spinner)], 25);
        match optimizer.optimize(&mut tree, &ctx) {
            Err(PlannerError::RuleCycle {
                iterations,
                last_rule,
            }) => {
                assert_eq!(iterations, 25);
                assert_eq!(last_rule, "CombineSelects");
            }
            other => panic!("expected a rule cycle, got {:?}", other.map(|s| s.iterations())),
        }
    }

    #[test]
    fn stack_skips_queued_dependents() {
        let mut stack = RuleStack::new();
        stack.push(RuleKind::RaiseAccess);
        assert!(stack.contains(RuleKind::RaiseAccess));
        assert_eq!(stack.pop(), Some(RuleKind::RaiseAccess));
        assert!(stack.is_empty());
    }

    #[test]
    fn optimizer_terminates_on_real_plans() {
        let caps = StaticCapabilities::new(SourceCapabilities::full());
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a, pm2.g1 AS b WHERE a.e2 = b.e2 AND a.e3 = TRUE",
            &caps,
        );
        let access = tree.find(|k| matches!(k, crate::plan::NodeKind::Access { .. }));
        assert_eq!(access.len(), 2);
    }
}
