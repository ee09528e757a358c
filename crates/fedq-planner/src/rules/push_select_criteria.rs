//! Moves each `Select` as far toward the sources as its elements allow.
//!
//! A select may pass another select, a duplicate removal, a join side that
//! produces every group it references (outer joins only on their preserved
//! side), an `Access` whose source can evaluate it, and a view, whose
//! projected symbols are substituted into the criteria on the way in. A
//! select needing both sides of an inner join becomes join criteria instead.
//! ON criteria of a join that reference only one side move into that side
//! where the join type allows.

use std::collections::{BTreeSet, HashMap};

use fedq_lang::{replace_elements, Criteria, Expression, JoinType};
use tracing::trace;

use crate::cost::estimate_cardinality;
use crate::criteria::CriteriaGroups;
use crate::error::Result;
use crate::plan::{NodeKind, PlanNodeId, PlanTree};

use super::{OptimizerRule, RuleContext, RuleKind, RuleStack};

pub struct PushSelectCriteria;

/// Where a select ends up.
enum Destination {
    /// Directly above this node, with these criteria.
    Above(PlanNodeId, Criteria),
    /// Into the criteria of this join.
    JoinCriteria(PlanNodeId, Criteria),
}

impl OptimizerRule for PushSelectCriteria {
    fn kind(&self) -> RuleKind {
        RuleKind::PushSelectCriteria
    }

    fn dependents(&self) -> &'static [RuleKind] {
        &[
            RuleKind::PushSelectCriteria,
            RuleKind::CombineSelects,
            RuleKind::RaiseAccess,
        ]
    }

    fn execute(&self, tree: &mut PlanTree, ctx: &RuleContext<'_>, _stack: &mut RuleStack) -> Result<bool> {
        let mut changed = push_join_criteria(tree)?;
        for select in tree.find(|k| matches!(k, NodeKind::Select { .. })) {
            if !tree.is_attached(select) {
                continue;
            }
            let NodeKind::Select { criteria } = tree.kind(select) else {
                continue;
            };
            let Some(destination) = find_destination(tree, ctx, select, criteria.clone()) else {
                continue;
            };
            tree.detach(select)?;
            match destination {
                Destination::Above(target, criteria) => {
                    trace!(select = %select, target = %target, "select pushed");
                    tree.node_mut(select).kind = NodeKind::Select { criteria };
                    tree.insert_above(target, select);
                }
                Destination::JoinCriteria(join, criteria) => {
                    trace!(select = %select, join = %join, "select merged into join");
                    if let NodeKind::Join {
                        join_type,
                        criteria: on,
                    } = &mut tree.node_mut(join).kind
                    {
                        on.extend(criteria.separate_conjuncts());
                        if *join_type == JoinType::Cross {
                            *join_type = JoinType::Inner;
                        }
                    }
                }
            }
            changed = true;
        }
        Ok(changed)
    }
}

/// Walk down from `select`; `None` when it should stay where it is.
fn find_destination(
    tree: &PlanTree,
    ctx: &RuleContext<'_>,
    select: PlanNodeId,
    mut criteria: Criteria,
) -> Option<Destination> {
    let mut info = CriteriaGroups::of(&criteria);
    if !info.complete {
        return None;
    }
    let mut cur = tree.child(select)?;
    // passing only other selects is not progress
    let mut progressed = false;

    loop {
        match tree.kind(cur) {
            NodeKind::Select { .. } => {
                cur = tree.child(cur)?;
            }
            NodeKind::DupRemove => {
                cur = tree.child(cur)?;
                progressed = true;
            }
            NodeKind::Join {
                join_type,
                criteria: _,
            } => {
                let (left, right) = match tree.children(cur) {
                    [l, r] => (*l, *r),
                    _ => break,
                };
                let (lg, rg) = (tree.groups(left), tree.groups(right));
                let can_left = info.groups.is_subset(&lg)
                    && matches!(join_type, JoinType::Inner | JoinType::Cross | JoinType::LeftOuter);
                let can_right = info.groups.is_subset(&rg)
                    && matches!(join_type, JoinType::Inner | JoinType::Cross | JoinType::RightOuter);
                let next = match (can_left, can_right) {
                    (true, true) => Some(cheaper_side(tree, ctx, left, right)),
                    (true, false) => Some(left),
                    (false, true) => Some(right),
                    (false, false) => None,
                };
                if let Some(next) = next {
                    cur = next;
                    progressed = true;
                    continue;
                }
                let both: BTreeSet<String> = lg.union(&rg).cloned().collect();
                if info.groups.is_subset(&both)
                    && matches!(join_type, JoinType::Inner | JoinType::Cross)
                    && !info.has_subquery
                {
                    return Some(Destination::JoinCriteria(cur, criteria));
                }
                break;
            }
            NodeKind::Access { model } => {
                let caps = ctx.capabilities.find_capabilities(model);
                let subqueries_local = info.subquery_groups.iter().all(|g| {
                    g.model()
                        .map(|m| m.eq_ignore_ascii_case(model))
                        .unwrap_or(false)
                });
                if !caps.supports_criteria(&criteria) || !subqueries_local {
                    break;
                }
                cur = tree.child(cur)?;
                progressed = true;
            }
            NodeKind::Source { .. } => {
                let Some(project) = view_projection(tree, cur) else {
                    break;
                };
                let Some(below) = tree.child(project) else {
                    break;
                };
                let mut mapped = criteria.clone();
                replace_elements(&mut mapped, &view_mapping(tree, cur, project));
                if mapped.has_subquery() && !info.has_subquery {
                    break;
                }
                let mapped_info = CriteriaGroups::of(&mapped);
                if !mapped_info.complete {
                    break;
                }
                criteria = mapped;
                info = mapped_info;
                cur = below;
                progressed = true;
            }
            NodeKind::Project { .. } | NodeKind::Limit { .. } | NodeKind::Null => break,
        }
    }

    if !progressed {
        return None;
    }
    Some(Destination::Above(cur, criteria))
}

/// The `Project` of a view's definition, looking through duplicate removal.
fn view_projection(tree: &PlanTree, source: PlanNodeId) -> Option<PlanNodeId> {
    let mut cur = tree.child(source)?;
    loop {
        match tree.kind(cur) {
            NodeKind::DupRemove => cur = tree.child(cur)?,
            NodeKind::Project { .. } => return Some(cur),
            _ => return None,
        }
    }
}

/// View column element to the expression its definition projects.
fn view_mapping(tree: &PlanTree, source: PlanNodeId, project: PlanNodeId) -> HashMap<fedq_lang::ElementSymbol, Expression> {
    let NodeKind::Project { symbols } = tree.kind(project) else {
        return HashMap::new();
    };
    tree.output_elements(source)
        .into_iter()
        .zip(symbols.iter().map(|s| s.expression.clone()))
        .collect()
}

fn cheaper_side(tree: &PlanTree, ctx: &RuleContext<'_>, left: PlanNodeId, right: PlanNodeId) -> PlanNodeId {
    match (
        estimate_cardinality(tree, left, ctx.store),
        estimate_cardinality(tree, right, ctx.store),
    ) {
        (Some(l), Some(r)) if r < l => right,
        _ => left,
    }
}

/// Move single-sided ON conjuncts into the join input they reference.
fn push_join_criteria(tree: &mut PlanTree) -> Result<bool> {
    let mut changed = false;
    for join in tree.find(|k| matches!(k, NodeKind::Join { .. })) {
        let (left, right) = match tree.children(join) {
            [l, r] => (*l, *r),
            _ => continue,
        };
        let NodeKind::Join {
            join_type,
            criteria,
        } = tree.kind(join)
        else {
            continue;
        };
        let join_type = *join_type;
        let (lg, rg) = (tree.groups(left), tree.groups(right));
        let mut keep = Vec::new();
        let mut moves = Vec::new();
        for conjunct in criteria.iter().cloned() {
            let info = CriteriaGroups::of(&conjunct);
            let side = if !info.complete || info.has_subquery || info.groups.is_empty() {
                None
            } else if info.groups.is_subset(&lg) {
                matches!(join_type, JoinType::Inner | JoinType::Cross | JoinType::RightOuter).then_some(left)
            } else if info.groups.is_subset(&rg) {
                matches!(join_type, JoinType::Inner | JoinType::Cross | JoinType::LeftOuter).then_some(right)
            } else {
                None
            };
            match side {
                Some(side) => moves.push((side, conjunct)),
                None => keep.push(conjunct),
            }
        }
        if moves.is_empty() {
            continue;
        }
        if let NodeKind::Join { criteria, .. } = &mut tree.node_mut(join).kind {
            *criteria = keep;
        }
        for (side, conjunct) in moves {
            let select = tree.add(NodeKind::Select { criteria: conjunct });
            tree.insert_above(side, select);
        }
        changed = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use crate::capabilities::{SourceCapabilities, StaticCapabilities};
    use crate::rules::tests::optimized;

    fn basic() -> StaticCapabilities {
        StaticCapabilities::new(SourceCapabilities::basic())
    }

    #[test]
    fn single_group_criteria_reaches_the_source() {
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a, pm2.g1 AS b WHERE a.e2 = 1 AND b.e1 = 'x'",
            &basic(),
        );
        let plan = tree.explain();
        assert!(plan.contains("Access pm1\n      Select [a.e2 = 1]\n"), "{}", plan);
        assert!(plan.contains("Access pm2\n      Select [b.e1 = 'x']\n"), "{}", plan);
    }

    #[test]
    fn two_sided_criteria_becomes_join_criteria() {
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a, pm2.g1 AS b WHERE a.e2 = b.e2",
            &basic(),
        );
        let plan = tree.explain();
        assert!(plan.contains("Join INNER JOIN [a.e2 = b.e2]"), "{}", plan);
        assert!(!plan.contains("Select"), "{}", plan);
    }

    #[test]
    fn null_producing_side_keeps_where_criteria_above_join() {
        // b.e3 IS NULL does not reject nulls, so the join stays outer
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a LEFT OUTER JOIN pm2.g1 AS b ON a.e2 = b.e2 WHERE b.e3 IS NULL",
            &basic(),
        );
        let plan = tree.explain();
        assert!(
            plan.starts_with("Project [a.e1]\n  Select [b.e3 IS NULL]\n    Join LEFT OUTER JOIN"),
            "{}",
            plan
        );
    }

    #[test]
    fn unsupported_criteria_stays_above_access() {
        let tree = optimized(
            "SELECT e1 FROM pm1.g1 WHERE e2 > 1",
            &StaticCapabilities::new(SourceCapabilities::none()),
        );
        let plan = tree.explain();
        assert!(plan.contains("Select [pm1.g1.e2 > 1]\n    Access pm1"), "{}", plan);
    }

    #[test]
    fn criteria_on_view_is_mapped_into_its_definition() {
        let tree = optimized("SELECT a FROM vm1.v1 WHERE b = 5", &basic());
        let plan = tree.explain();
        // the view's own filter may be combined with the mapped conjunct
        assert!(
            plan.lines()
                .any(|l| l.trim_start().starts_with("Select [") && l.contains("pm1.g1.e2 = 5")),
            "{}",
            plan
        );
        assert!(!plan.contains("vm1.v1.b = 5"), "{}", plan);
    }

    #[test]
    fn on_criteria_for_null_producing_side_moves_into_it() {
        let tree = optimized(
            "SELECT a.e1 FROM pm1.g1 AS a LEFT OUTER JOIN pm2.g1 AS b ON a.e2 = b.e2 AND b.e3 = TRUE AND a.e3 = FALSE",
            &basic(),
        );
        let plan = tree.explain();
        assert!(plan.contains("Select [b.e3 = TRUE]"), "{}", plan);
        // the preserved side's ON conjunct must stay in the join
        assert!(plan.contains("[a.e2 = b.e2 AND a.e3 = FALSE]"), "{}", plan);
    }

    #[test]
    fn groupless_criteria_goes_to_the_smaller_side() {
        // pm1.g2 declares cardinality 10, pm1.g1 1000
        let tree = optimized("SELECT a.e1 FROM pm1.g1 AS a, pm1.g2 AS b WHERE ? = 1", &basic());
        let plan = tree.explain();
        assert!(plan.contains("Select [? = 1]\n        Source pm1.g2 AS b"), "{}", plan);
    }
}
