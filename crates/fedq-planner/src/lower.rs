//! Optimized plan tree to physical program.
//!
//! Each `Access` subtree is folded back into a single query for its source:
//! limit, distinct and projection peel off the top, selects become WHERE
//! conjuncts and the join tree becomes the FROM clause. Criteria found on a
//! join input float up to the nearest place where they keep their meaning.

use fedq_lang::{
    Criteria, ElementSymbol, Expression, ExpressionSymbol, FromClause, FromList, JoinPredicate, JoinType,
    Limit, Query, Select, SelectSymbol,
};

use crate::error::{PlannerError, Result};
use crate::physical::PhysicalNode;
use crate::plan::{NodeKind, PlanNodeId, PlanTree};

pub fn lower_to_physical(tree: &PlanTree) -> Result<PhysicalNode> {
    lower(tree, tree.root()?)
}

fn lower(tree: &PlanTree, id: PlanNodeId) -> Result<PhysicalNode> {
    let output = tree.output_elements(id);
    let input = |tree: &PlanTree| -> Result<Box<PhysicalNode>> {
        let child = tree
            .child(id)
            .ok_or_else(|| PlannerError::Invariant(format!("{} node has no input", tree.kind(id).name())))?;
        Ok(Box::new(lower(tree, child)?))
    };
    Ok(match tree.kind(id) {
        NodeKind::Project { symbols } => PhysicalNode::Project {
            symbols: symbols.clone(),
            input: match tree.child(id) {
                Some(c) => Some(Box::new(lower(tree, c)?)),
                None => None,
            },
            output,
        },
        NodeKind::Select { criteria } => PhysicalNode::Select {
            criteria: criteria.clone(),
            input: input(tree)?,
            output,
        },
        NodeKind::Join {
            join_type,
            criteria,
        } => {
            let (left, right) = binary(tree, id)?;
            PhysicalNode::Join {
                join_type: *join_type,
                criteria: criteria.clone(),
                left: Box::new(lower(tree, left)?),
                right: Box::new(lower(tree, right)?),
                output,
            }
        }
        NodeKind::DupRemove => PhysicalNode::DupRemove {
            input: input(tree)?,
            output,
        },
        NodeKind::Limit { offset, row_limit } => PhysicalNode::Limit {
            offset: *offset,
            row_limit: *row_limit,
            input: input(tree)?,
            output,
        },
        NodeKind::Null => PhysicalNode::Null { output },
        NodeKind::Source { group, .. } => match tree.child(id) {
            Some(definition) => lower(tree, definition)?.with_output(output),
            None => {
                return Err(PlannerError::Invariant(format!(
                    "source {} is not beneath an access node",
                    group
                )))
            }
        },
        NodeKind::Access { model } => {
            let top = tree
                .child(id)
                .ok_or_else(|| PlannerError::Invariant(format!("access to {} is empty", model)))?;
            PhysicalNode::Access {
                model: model.clone(),
                command: access_query(tree, top)?,
                output,
            }
        }
    })
}

fn binary(tree: &PlanTree, id: PlanNodeId) -> Result<(PlanNodeId, PlanNodeId)> {
    match tree.children(id) {
        [l, r] => Ok((*l, *r)),
        other => Err(PlannerError::Invariant(format!(
            "join node has {} children",
            other.len()
        ))),
    }
}

/// The query a source runs for the subtree at `top`.
pub fn access_query(tree: &PlanTree, top: PlanNodeId) -> Result<Query> {
    let mut query = Query::default();
    let mut cur = top;

    if let NodeKind::Limit { offset, row_limit } = tree.kind(cur) {
        query.limit = Some(Limit {
            offset: *offset,
            row_limit: *row_limit,
        });
        cur = next(tree, cur)?;
    }
    if let NodeKind::DupRemove = tree.kind(cur) {
        query.select.distinct = true;
        cur = next(tree, cur)?;
    }
    query.select = Select {
        distinct: query.select.distinct,
        symbols: match tree.kind(cur) {
            NodeKind::Project { symbols } => {
                let symbols = symbols.iter().cloned().map(SelectSymbol::Expression).collect();
                cur = next(tree, cur)?;
                symbols
            }
            _ => tree
                .output_elements(cur)
                .into_iter()
                .map(element_symbol)
                .collect(),
        },
    };

    let mut conjuncts = Vec::new();
    while let NodeKind::Select { criteria } = tree.kind(cur) {
        conjuncts.push(criteria.clone());
        cur = next(tree, cur)?;
    }
    let (clause, floating) = from_clause(tree, cur)?;
    conjuncts.extend(floating);
    query.from = Some(FromList {
        clauses: vec![clause],
    });
    query.criteria = Criteria::combine_conjuncts(
        conjuncts
            .into_iter()
            .flat_map(Criteria::separate_conjuncts)
            .collect(),
    );
    Ok(query)
}

fn next(tree: &PlanTree, id: PlanNodeId) -> Result<PlanNodeId> {
    tree.child(id).ok_or_else(|| {
        PlannerError::Invariant(format!(
            "{} node inside an access has no input",
            tree.kind(id).name()
        ))
    })
}

fn element_symbol(e: ElementSymbol) -> SelectSymbol {
    SelectSymbol::Expression(ExpressionSymbol::new(Expression::Element(e)))
}

/// FROM clause for a join tree, plus criteria that must be applied above it.
fn from_clause(tree: &PlanTree, id: PlanNodeId) -> Result<(FromClause, Vec<Criteria>)> {
    match tree.kind(id) {
        NodeKind::Source { group, .. } if tree.children(id).is_empty() => {
            Ok((FromClause::unary(group.clone()), Vec::new()))
        }
        NodeKind::Select { criteria } => {
            let (clause, mut floating) = from_clause(tree, next(tree, id)?)?;
            floating.push(criteria.clone());
            Ok((clause, floating))
        }
        NodeKind::Join {
            join_type,
            criteria,
        } => {
            let (left, right) = binary(tree, id)?;
            let (left, left_floating) = from_clause(tree, left)?;
            let (right, right_floating) = from_clause(tree, right)?;
            let mut on = criteria.clone();
            let mut floating = Vec::new();
            match join_type {
                JoinType::Inner | JoinType::Cross => {
                    floating.extend(left_floating);
                    floating.extend(right_floating);
                }
                // a filter on the null-producing input restricts the match
                JoinType::LeftOuter => {
                    on.extend(right_floating);
                    floating.extend(left_floating);
                }
                JoinType::RightOuter => {
                    on.extend(left_floating);
                    floating.extend(right_floating);
                }
                JoinType::FullOuter => {
                    if !left_floating.is_empty() || !right_floating.is_empty() {
                        return Err(PlannerError::Invariant(
                            "criteria beneath a full outer join inside an access".into(),
                        ));
                    }
                }
            }
            let join_type = match (*join_type, on.is_empty()) {
                (JoinType::Cross, false) => JoinType::Inner,
                (JoinType::Inner, true) => JoinType::Cross,
                (other, _) => other,
            };
            Ok((
                FromClause::Join(JoinPredicate {
                    left: Box::new(left),
                    right: Box::new(right),
                    join_type,
                    criteria: on,
                }),
                floating,
            ))
        }
        other => Err(PlannerError::Invariant(format!(
            "{} node cannot be part of a source command",
            other.name()
        ))),
    }
}
