//! Raises `Access` nodes over the work their source can do itself, so the
//! command sent to a source grows to cover as much of the plan as its
//! capabilities allow. Two accesses to the same model under a join merge into
//! one. An access never rises above a `Source`: views keep their own scope.

use fedq_lang::{Criteria, Expression, JoinType};
use tracing::trace;

use crate::capabilities::SourceCapabilities;
use crate::criteria::CriteriaGroups;
use crate::error::Result;
use crate::plan::{NodeKind, PlanNodeId, PlanTree};

use super::{OptimizerRule, RuleContext, RuleKind, RuleStack};

pub struct RaiseAccess;

impl OptimizerRule for RaiseAccess {
    fn kind(&self) -> RuleKind {
        RuleKind::RaiseAccess
    }

    fn dependents(&self) -> &'static [RuleKind] {
        &[RuleKind::RaiseAccess, RuleKind::PushSelectCriteria]
    }

    fn execute(&self, tree: &mut PlanTree, ctx: &RuleContext<'_>, _stack: &mut RuleStack) -> Result<bool> {
        let mut changed = false;
        for access in tree.find(|k| matches!(k, NodeKind::Access { .. })) {
            if !tree.is_attached(access) {
                continue;
            }
            let NodeKind::Access { model } = tree.kind(access) else {
                continue;
            };
            let model = model.clone();
            let Some(parent) = tree.parent(access) else {
                continue;
            };
            let caps = ctx.capabilities.find_capabilities(&model);
            let raised = match tree.kind(parent) {
                NodeKind::Select { criteria } => {
                    if criteria_pushable(&caps, criteria, &model) {
                        raise_over(tree, access, parent)?;
                        true
                    } else {
                        false
                    }
                }
                NodeKind::Project { symbols } => {
                    let plain = symbols
                        .iter()
                        .all(|s| matches!(s.expression, Expression::Element(_)));
                    let supported = symbols.iter().all(|s| {
                        !matches!(s.expression, Expression::ScalarSubquery(_))
                            && caps.supports_expression(&s.expression)
                    });
                    if (plain || caps.select_expressions) && supported {
                        raise_over(tree, access, parent)?;
                        true
                    } else {
                        false
                    }
                }
                NodeKind::DupRemove => {
                    let over_project = tree
                        .child(access)
                        .map(|c| matches!(tree.kind(c), NodeKind::Project { .. }))
                        .unwrap_or(false);
                    if caps.select_distinct && over_project {
                        raise_over(tree, access, parent)?;
                        true
                    } else {
                        false
                    }
                }
                NodeKind::Limit { .. } => {
                    if caps.row_limit && contains_project(tree, access) {
                        raise_over(tree, access, parent)?;
                        true
                    } else {
                        false
                    }
                }
                NodeKind::Join { .. } => merge_join(tree, &caps, &model, parent)?,
                NodeKind::Source { .. } | NodeKind::Access { .. } | NodeKind::Null => false,
            };
            if raised {
                trace!(access = %access, model = %model, "access raised");
            }
            changed |= raised;
        }
        Ok(changed)
    }
}

fn criteria_pushable(caps: &SourceCapabilities, criteria: &Criteria, model: &str) -> bool {
    let info = CriteriaGroups::of(criteria);
    caps.supports_criteria(criteria)
        && info.subquery_groups.iter().all(|g| {
            g.model()
                .map(|m| m.eq_ignore_ascii_case(model))
                .unwrap_or(false)
        })
}

/// `parent -> access -> x` becomes `access -> parent -> x`.
fn raise_over(tree: &mut PlanTree, access: PlanNodeId, parent: PlanNodeId) -> Result<()> {
    tree.detach(access)?;
    tree.insert_above(parent, access);
    Ok(())
}

fn contains_project(tree: &PlanTree, access: PlanNodeId) -> bool {
    let mut cur = tree.child(access);
    while let Some(id) = cur {
        match tree.kind(id) {
            NodeKind::Project { .. } => return true,
            NodeKind::DupRemove => cur = tree.child(id),
            _ => return false,
        }
    }
    false
}

fn contains_select(tree: &PlanTree, id: PlanNodeId) -> bool {
    matches!(tree.kind(id), NodeKind::Select { .. })
        || tree.children(id).iter().any(|&c| contains_select(tree, c))
}

/// Merge two same-model accesses beneath `join` into one above it.
fn merge_join(tree: &mut PlanTree, caps: &SourceCapabilities, model: &str, join: PlanNodeId) -> Result<bool> {
    let (left, right) = match tree.children(join) {
        [l, r] => (*l, *r),
        _ => return Ok(false),
    };
    let same_model = |id: PlanNodeId| match tree.kind(id) {
        NodeKind::Access { model: m } => m.eq_ignore_ascii_case(model),
        _ => false,
    };
    if !same_model(left) || !same_model(right) {
        return Ok(false);
    }
    let NodeKind::Join {
        join_type,
        criteria,
    } = tree.kind(join)
    else {
        return Ok(false);
    };
    if !caps.supports_join(*join_type) || !criteria.iter().all(|c| criteria_pushable(caps, c, model)) {
        return Ok(false);
    }
    if *join_type == JoinType::FullOuter && (contains_select(tree, left) || contains_select(tree, right)) {
        return Ok(false);
    }
    // both sides must be plain row sources for the merged command
    let plain = |id: PlanNodeId| {
        tree.child(id)
            .map(|c| !matches!(tree.kind(c), NodeKind::Project { .. } | NodeKind::DupRemove | NodeKind::Limit { .. }))
            .unwrap_or(false)
    };
    if !plain(left) || !plain(right) {
        return Ok(false);
    }
    tree.detach(left)?;
    tree.detach(right)?;
    tree.insert_above(join, left);
    Ok(true)
}
