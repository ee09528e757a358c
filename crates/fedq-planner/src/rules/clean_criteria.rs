use fedq_lang::{CompareOp, CompoundCriteria, Criteria, Expression, JoinType, LogicalOp};
use std::cmp::Ordering;

use crate::error::Result;
use crate::plan::{NodeKind, PlanTree};

use super::{OptimizerRule, RuleContext, RuleKind, RuleStack};

/// Folds criteria over constants. A select that is always true disappears;
/// one that is never true turns its subtree into a `Null` node.
pub struct CleanCriteria;

impl OptimizerRule for CleanCriteria {
    fn kind(&self) -> RuleKind {
        RuleKind::CleanCriteria
    }

    fn execute(&self, tree: &mut PlanTree, _ctx: &RuleContext<'_>, _stack: &mut RuleStack) -> Result<bool> {
        let mut changed = false;
        for id in tree.find(|k| matches!(k, NodeKind::Select { .. } | NodeKind::Join { .. })) {
            if let NodeKind::Select { criteria } = tree.kind(id) {
                let folded = fold(criteria.clone());
                if folded == *criteria {
                    continue;
                }
                match folded {
                    Criteria::Literal(true) => tree.detach(id)?,
                    Criteria::Literal(false) => tree.node_mut(id).kind = NodeKind::Null,
                    other => tree.node_mut(id).kind = NodeKind::Select { criteria: other },
                }
                changed = true;
                continue;
            }
            match &mut tree.node_mut(id).kind {
                NodeKind::Join {
                    join_type,
                    criteria,
                } => {
                    let before = criteria.clone();
                    let folded: Vec<Criteria> = criteria
                        .drain(..)
                        .map(fold)
                        .filter(|c| *c != Criteria::Literal(true))
                        .collect();
                    let never = folded.contains(&Criteria::Literal(false))
                        && matches!(join_type, JoinType::Inner | JoinType::Cross);
                    changed |= folded != before;
                    *criteria = folded;
                    if never {
                        tree.node_mut(id).kind = NodeKind::Null;
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        Ok(changed)
    }
}

/// Evaluate whatever can be evaluated without a row.
pub(crate) fn fold(criteria: Criteria) -> Criteria {
    match criteria {
        Criteria::Compare(c) => match (&c.left, &c.right) {
            (Expression::Constant(l), Expression::Constant(r)) => match l.value.sql_cmp(&r.value) {
                Some(ord) => Criteria::Literal(compare_holds(c.operator, ord)),
                None => Criteria::Compare(c),
            },
            _ => Criteria::Compare(c),
        },
        Criteria::IsNull(n) => match &n.expression {
            Expression::Constant(k) => Criteria::Literal(k.value.is_null() != n.negated),
            _ => Criteria::IsNull(n),
        },
        Criteria::Not(n) => match fold(*n.criteria) {
            Criteria::Literal(b) => Criteria::Literal(!b),
            inner => Criteria::Not(fedq_lang::NotCriteria {
                criteria: Box::new(inner),
            }),
        },
        Criteria::Compound(c) => {
            // AND absorbs on false, OR on true
            let absorbing = c.operator == LogicalOp::Or;
            let mut parts = Vec::with_capacity(c.criteria.len());
            for part in c.criteria.into_iter().map(fold) {
                match part {
                    Criteria::Literal(b) if b == absorbing => return Criteria::Literal(absorbing),
                    Criteria::Literal(_) => {}
                    other => parts.push(other),
                }
            }
            match parts.len() {
                0 => Criteria::Literal(!absorbing),
                1 => parts.pop().unwrap_or(Criteria::Literal(!absorbing)),
                _ => Criteria::Compound(CompoundCriteria {
                    operator: c.operator,
                    criteria: parts,
                }),
            }
        }
        other => other,
    }
}

fn compare_holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}
