use fedq_lang::Criteria;

use crate::error::Result;
use crate::plan::{NodeKind, PlanTree};

use super::{OptimizerRule, RuleContext, RuleKind, RuleStack};

/// ANDs a select into the select directly above it.
pub struct CombineSelects;

impl OptimizerRule for CombineSelects {
    fn kind(&self) -> RuleKind {
        RuleKind::CombineSelects
    }

    fn execute(&self, tree: &mut PlanTree, _ctx: &RuleContext<'_>, _stack: &mut RuleStack) -> Result<bool> {
        let mut changed = false;
        for upper in tree.find(|k| matches!(k, NodeKind::Select { .. })) {
            if !tree.is_attached(upper) {
                continue;
            }
            while let Some(lower) = tree.child(upper) {
                let (NodeKind::Select { criteria: a }, NodeKind::Select { criteria: b }) =
                    (tree.kind(upper), tree.kind(lower))
                else {
                    break;
                };
                let mut parts = a.clone().separate_conjuncts();
                parts.extend(b.clone().separate_conjuncts());
                let Some(combined) = Criteria::combine_conjuncts(parts) else {
                    break;
                };
                tree.node_mut(upper).kind = NodeKind::Select { criteria: combined };
                tree.detach(lower)?;
                changed = true;
            }
        }
        Ok(changed)
    }
}
