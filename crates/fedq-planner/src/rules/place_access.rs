use crate::error::{PlannerError, Result};
use crate::plan::{NodeKind, PlanTree};

use super::{OptimizerRule, RuleContext, RuleKind, RuleStack};

/// Puts an `Access` node above every physical `Source`.
pub struct PlaceAccess;

impl OptimizerRule for PlaceAccess {
    fn kind(&self) -> RuleKind {
        RuleKind::PlaceAccess
    }

    fn execute(&self, tree: &mut PlanTree, _ctx: &RuleContext<'_>, _stack: &mut RuleStack) -> Result<bool> {
        let leaves = tree.find(|k| matches!(k, NodeKind::Source { .. }));
        let mut changed = false;
        for id in leaves {
            if !tree.children(id).is_empty() {
                continue;
            }
            if let Some(p) = tree.parent(id) {
                if matches!(tree.kind(p), NodeKind::Access { .. }) {
                    continue;
                }
            }
            let NodeKind::Source { group, .. } = tree.kind(id) else {
                continue;
            };
            let model = group
                .model()
                .map(str::to_string)
                .ok_or_else(|| PlannerError::Invariant(format!("source {} has no model", group.name)))?;
            let access = tree.add(NodeKind::Access { model });
            tree.insert_above(id, access);
            changed = true;
        }
        Ok(changed)
    }
}
