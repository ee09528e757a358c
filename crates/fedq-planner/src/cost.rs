//! Coarse cardinality estimation over the plan tree.
//!
//! Estimates start from table cardinalities recorded in metadata and are
//! scaled by fixed selectivity guesses. Any unknown input makes the estimate
//! unknown; callers must treat `None` as "no information", never as zero.

use fedq_lang::{CompareOp, Criteria, JoinType, LogicalOp};
use fedq_meta::MetadataStore;

use crate::plan::{NodeKind, PlanNodeId, PlanTree};

/// Fraction of rows expected to satisfy `criteria`.
pub fn criteria_selectivity(criteria: &Criteria) -> f64 {
    match criteria {
        Criteria::Compare(c) => match c.operator {
            CompareOp::Eq => 0.1,
            CompareOp::Ne => 0.9,
            _ => 0.33,
        },
        Criteria::IsNull(c) if c.negated => 0.95,
        Criteria::IsNull(_) => 0.05,
        Criteria::Set(s) => {
            let p = (0.1 * s.values.len() as f64).min(0.9);
            if s.negated {
                1.0 - p
            } else {
                p
            }
        }
        Criteria::Not(n) => 1.0 - criteria_selectivity(&n.criteria),
        Criteria::Compound(c) => match c.operator {
            LogicalOp::And => c.criteria.iter().map(criteria_selectivity).product(),
            LogicalOp::Or => {
                let miss: f64 = c.criteria.iter().map(|p| 1.0 - criteria_selectivity(p)).product();
                1.0 - miss
            }
        },
        Criteria::Literal(true) => 1.0,
        Criteria::Literal(false) => 0.0,
        Criteria::Exists(_) => 0.5,
    }
}

fn join_cardinality(left: f64, right: f64, join_type: JoinType) -> f64 {
    match join_type {
        JoinType::Cross => left * right,
        JoinType::Inner => (left * right).sqrt().max(1.0).min(left.min(right).max(1.0)),
        JoinType::LeftOuter => left * 1.2,
        JoinType::RightOuter => right * 1.2,
        JoinType::FullOuter => left.max(right) * 1.5,
    }
}

/// Estimated rows produced by `id`.
pub fn estimate_cardinality(tree: &PlanTree, id: PlanNodeId, store: &MetadataStore) -> Option<f64> {
    let child = |i: usize| -> Option<f64> {
        tree.children(id)
            .get(i)
            .and_then(|&c| estimate_cardinality(tree, c, store))
    };
    match tree.kind(id) {
        NodeKind::Source { group, .. } => {
            if let Some(view) = tree.child(id) {
                return estimate_cardinality(tree, view, store);
            }
            let full_name = group
                .binding
                .as_ref()
                .map(|b| b.full_name.as_str())
                .unwrap_or_else(|| group.non_correlation_name());
            store
                .find_table(full_name)
                .ok()
                .and_then(|(_, t)| t.cardinality_hint())
                .map(|c| c as f64)
        }
        NodeKind::Select { criteria } => child(0).map(|rows| (rows * criteria_selectivity(criteria)).max(1.0)),
        NodeKind::Join { join_type, .. } => {
            let (l, r) = (child(0)?, child(1)?);
            Some(join_cardinality(l, r, *join_type).max(1.0))
        }
        NodeKind::Limit { row_limit, .. } => child(0).map(|rows| rows.min(*row_limit as f64)),
        NodeKind::Project { .. } if tree.children(id).is_empty() => Some(1.0),
        NodeKind::Null => Some(0.0),
        NodeKind::Project { .. } | NodeKind::Access { .. } | NodeKind::DupRemove => child(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_lang::QueryParser;

    #[test]
    fn selectivity_heuristics() {
        let eq = QueryParser::parse_criteria("a = 1").unwrap();
        let range = QueryParser::parse_criteria("a > 1").unwrap();
        let both = QueryParser::parse_criteria("a = 1 AND a > 1").unwrap();
        assert_eq!(criteria_selectivity(&eq), 0.1);
        assert!((criteria_selectivity(&both) - 0.033).abs() < 1e-9);
        assert!(criteria_selectivity(&range) > criteria_selectivity(&eq));
        let either = QueryParser::parse_criteria("a = 1 OR b = 1").unwrap();
        assert!((criteria_selectivity(&either) - 0.19).abs() < 1e-9);
    }

    #[test]
    fn join_estimates() {
        assert_eq!(join_cardinality(10.0, 20.0, JoinType::Cross), 200.0);
        assert!(join_cardinality(100.0, 10_000.0, JoinType::Inner) <= 100.0);
        assert_eq!(join_cardinality(10.0, 1.0, JoinType::LeftOuter), 12.0);
    }
}
