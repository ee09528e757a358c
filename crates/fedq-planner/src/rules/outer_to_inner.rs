use std::collections::BTreeSet;

use fedq_lang::JoinType;
use tracing::trace;

use crate::criteria::null_rejected_elements;
use crate::error::Result;
use crate::plan::{NodeKind, PlanNodeId, PlanTree};

use super::{OptimizerRule, RuleContext, RuleKind, RuleStack};

/// Narrows outer joins whose null-extended rows are rejected by criteria
/// above them: a select or inner join that cannot be true when an element of
/// the null-producing side is null.
pub struct OuterToInnerJoin;

impl OptimizerRule for OuterToInnerJoin {
    fn kind(&self) -> RuleKind {
        RuleKind::OuterToInnerJoin
    }

    fn dependents(&self) -> &'static [RuleKind] {
        &[RuleKind::PushSelectCriteria]
    }

    fn execute(&self, tree: &mut PlanTree, _ctx: &RuleContext<'_>, _stack: &mut RuleStack) -> Result<bool> {
        let mut changed = false;
        for join in tree.find(|k| matches!(k, NodeKind::Join { join_type, .. } if join_type.is_outer())) {
            let (left, right) = match tree.children(join) {
                [l, r] => (*l, *r),
                _ => continue,
            };
            let rejected = rejected_groups_above(tree, join);
            if rejected.is_empty() {
                continue;
            }
            let left_rejected = !rejected.is_disjoint(&tree.groups(left));
            let right_rejected = !rejected.is_disjoint(&tree.groups(right));
            let NodeKind::Join { join_type, .. } = &mut tree.node_mut(join).kind else {
                continue;
            };
            let narrowed = match (*join_type, left_rejected, right_rejected) {
                (JoinType::LeftOuter, _, true) => JoinType::Inner,
                (JoinType::RightOuter, true, _) => JoinType::Inner,
                (JoinType::FullOuter, true, true) => JoinType::Inner,
                (JoinType::FullOuter, true, false) => JoinType::LeftOuter,
                (JoinType::FullOuter, false, true) => JoinType::RightOuter,
                (other, _, _) => other,
            };
            if narrowed != *join_type {
                trace!(join = %join, from = join_type.sql(), to = narrowed.sql(), "outer join narrowed");
                *join_type = narrowed;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Groups whose nulls are rejected by selects and inner joins between `join`
/// and the nearest node that is neither.
fn rejected_groups_above(tree: &PlanTree, join: PlanNodeId) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut cur = join;
    while let Some(parent) = tree.parent(cur) {
        match tree.kind(parent) {
            NodeKind::Select { criteria } => collect(criteria, &mut out),
            NodeKind::Join {
                join_type: JoinType::Inner | JoinType::Cross,
                criteria,
            } => {
                for c in criteria {
                    collect(c, &mut out);
                }
            }
            // null-extended rows of an enclosing outer join may still pass
            NodeKind::Join { join_type, .. } => {
                let preserved = match join_type {
                    JoinType::LeftOuter => tree.children(parent).first(),
                    JoinType::RightOuter => tree.children(parent).get(1),
                    _ => None,
                };
                if preserved != Some(&cur) {
                    break;
                }
            }
            _ => break,
        }
        cur = parent;
    }
    out
}

fn collect(criteria: &fedq_lang::Criteria, out: &mut BTreeSet<String>) {
    for e in null_rejected_elements(criteria) {
        if let Some(g) = e.group {
            out.insert(g.to_ascii_lowercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::capabilities::{SourceCapabilities, StaticCapabilities};
    use crate::rules::tests::optimized;

    fn none() -> StaticCapabilities {
        StaticCapabilities::new(SourceCapabilities::none())
    }

    #[test]
    fn where_on_null_producing_side_makes_left_join_inner() {
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a LEFT OUTER JOIN pm2.g1 AS b ON a.e2 = b.e2 WHERE b.e1 = 'x'",
            &none(),
        );
        let plan = tree.explain();
        assert!(plan.contains("Join INNER JOIN [a.e2 = b.e2]"), "{}", plan);
    }

    #[test]
    fn is_null_keeps_the_outer_join() {
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a LEFT OUTER JOIN pm2.g1 AS b ON a.e2 = b.e2 WHERE b.e1 IS NULL",
            &none(),
        );
        assert!(tree.explain().contains("LEFT OUTER JOIN"));
    }

    #[test]
    fn full_join_narrows_to_the_rejected_side() {
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a FULL OUTER JOIN pm2.g1 AS b ON a.e2 = b.e2 WHERE a.e1 = 'x'",
            &none(),
        );
        assert!(tree.explain().contains("Join LEFT OUTER JOIN"), "{}", tree);
    }

    #[test]
    fn coalesce_does_not_reject_nulls() {
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a LEFT OUTER JOIN pm2.g1 AS b ON a.e2 = b.e2 WHERE coalesce(b.e1, 'x') = 'x'",
            &none(),
        );
        assert!(tree.explain().contains("LEFT OUTER JOIN"));
    }
}
