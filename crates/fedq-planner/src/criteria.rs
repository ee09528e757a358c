//! Element analysis of criteria.

use std::collections::{BTreeSet, HashSet};

use fedq_lang::{
    Criteria, ElementCollectorVisitor, ElementSymbol, Expression, GroupCollectorVisitor, LogicalOp,
};

/// Every element the criteria mentions in its own scope. Both branches of an
/// OR contribute, so the result never misses an element the criteria may
/// need, at the price of sometimes naming one it does not.
pub fn elements_in_criteria(criteria: &Criteria) -> HashSet<ElementSymbol> {
    ElementCollectorVisitor::get_elements(criteria, true)
        .into_iter()
        .collect()
}

/// Elements that appear in every way the criteria can be satisfied:
/// conjuncts union, disjuncts intersect.
pub fn required_elements_in_criteria(criteria: &Criteria) -> HashSet<ElementSymbol> {
    match criteria {
        Criteria::Compound(c) => {
            let mut parts = c.criteria.iter().map(required_elements_in_criteria);
            let Some(first) = parts.next() else {
                return HashSet::new();
            };
            match c.operator {
                LogicalOp::And => parts.fold(first, |mut acc, p| {
                    acc.extend(p);
                    acc
                }),
                LogicalOp::Or => parts.fold(first, |acc, p| acc.intersection(&p).cloned().collect()),
            }
        }
        Criteria::Not(n) => match n.criteria.as_ref() {
            Criteria::Compound(_) => HashSet::new(),
            inner => required_elements_in_criteria(inner),
        },
        Criteria::Exists(_) | Criteria::Literal(_) => HashSet::new(),
        other => elements_in_criteria(other),
    }
}

const NULL_TOLERANT_FUNCTIONS: &[&str] = &["ifnull", "nvl", "coalesce", "nullif"];

fn null_tolerant(expr: &Expression) -> bool {
    match expr {
        Expression::Function(f) => {
            NULL_TOLERANT_FUNCTIONS.contains(&f.name.to_ascii_lowercase().as_str())
                || f.args.iter().any(null_tolerant)
        }
        Expression::SearchedCase(_) | Expression::ScalarSubquery(_) => true,
        _ => false,
    }
}

/// Elements that must be non-null for the criteria to be true. Used to turn
/// outer joins into inner joins.
pub fn null_rejected_elements(criteria: &Criteria) -> HashSet<ElementSymbol> {
    match criteria {
        Criteria::Compound(c) => {
            let mut parts = c.criteria.iter().map(null_rejected_elements);
            let Some(first) = parts.next() else {
                return HashSet::new();
            };
            match c.operator {
                LogicalOp::And => parts.fold(first, |mut acc, p| {
                    acc.extend(p);
                    acc
                }),
                LogicalOp::Or => parts.fold(first, |acc, p| acc.intersection(&p).cloned().collect()),
            }
        }
        Criteria::Compare(c) if !null_tolerant(&c.left) && !null_tolerant(&c.right) => {
            elements_in_criteria(criteria)
        }
        Criteria::Set(s) if !null_tolerant(&s.expression) => {
            ElementCollectorVisitor::get_elements(&s.expression, true)
                .into_iter()
                .collect()
        }
        Criteria::IsNull(c) if c.negated && !null_tolerant(&c.expression) => {
            elements_in_criteria(criteria)
        }
        _ => HashSet::new(),
    }
}

/// Where a criteria's elements come from.
#[derive(Debug, Clone, Default)]
pub struct CriteriaGroups {
    /// Lower-case groups of the elements in the criteria's own scope, plus
    /// outer groups referenced from inside its subqueries.
    pub groups: BTreeSet<String>,
    /// False when some element has no group; such criteria are not moved.
    pub complete: bool,
    pub has_subquery: bool,
    /// Groups read by nested subqueries, for source placement checks.
    pub subquery_groups: Vec<fedq_lang::GroupSymbol>,
}

impl CriteriaGroups {
    pub fn of(criteria: &Criteria) -> Self {
        let mut out = CriteriaGroups {
            complete: true,
            has_subquery: criteria.has_subquery(),
            ..Default::default()
        };
        let shallow = ElementCollectorVisitor::get_elements(criteria, true);
        for e in &shallow {
            match &e.group {
                Some(g) => {
                    out.groups.insert(g.to_ascii_lowercase());
                }
                None => out.complete = false,
            }
        }
        if out.has_subquery {
            for e in ElementCollectorVisitor::get_elements_deep(criteria) {
                if e.external {
                    match &e.group {
                        Some(g) => {
                            out.groups.insert(g.to_ascii_lowercase());
                        }
                        None => out.complete = false,
                    }
                }
            }
            let all = GroupCollectorVisitor::get_groups_ignore_inline_views(criteria, true);
            out.subquery_groups = all;
        }
        out
    }
}
