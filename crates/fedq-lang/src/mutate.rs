//! In-place rewriting of expressions inside criteria and expressions.
//!
//! The walk is post-order over the current scope; nested query bodies are not
//! entered because their elements belong to another scope.

use std::collections::HashMap;

use crate::expr::{Criteria, Expression};
use crate::symbol::ElementSymbol;

/// Apply `f` to every expression node (children first).
pub fn for_each_expression_mut(expr: &mut Expression, f: &mut dyn FnMut(&mut Expression)) {
    match expr {
        Expression::Function(func) => {
            for arg in func.args.iter_mut() {
                for_each_expression_mut(arg, f);
            }
        }
        Expression::SearchedCase(case) => {
            for when in case.when.iter_mut() {
                for_each_criteria_expression_mut(when, f);
            }
            for then in case.then.iter_mut() {
                for_each_expression_mut(then, f);
            }
            if let Some(e) = case.else_expression.as_deref_mut() {
                for_each_expression_mut(e, f);
            }
        }
        Expression::Element(_)
        | Expression::Constant(_)
        | Expression::Reference(_)
        | Expression::ScalarSubquery(_) => {}
    }
    f(expr);
}

/// Apply `f` to every expression appearing in `criteria`.
pub fn for_each_criteria_expression_mut(
    criteria: &mut Criteria,
    f: &mut dyn FnMut(&mut Expression),
) {
    match criteria {
        Criteria::Compare(c) => {
            for_each_expression_mut(&mut c.left, f);
            for_each_expression_mut(&mut c.right, f);
        }
        Criteria::IsNull(c) => for_each_expression_mut(&mut c.expression, f),
        Criteria::Not(n) => for_each_criteria_expression_mut(&mut n.criteria, f),
        Criteria::Compound(c) => {
            for part in c.criteria.iter_mut() {
                for_each_criteria_expression_mut(part, f);
            }
        }
        Criteria::Set(s) => {
            for_each_expression_mut(&mut s.expression, f);
            for v in s.values.iter_mut() {
                for_each_expression_mut(v, f);
            }
        }
        Criteria::Exists(_) | Criteria::Literal(_) => {}
    }
}

/// Replace element references found in `mapping` with the mapped expression.
/// Returns how many replacements were made.
pub fn replace_elements(
    criteria: &mut Criteria,
    mapping: &HashMap<ElementSymbol, Expression>,
) -> usize {
    let mut replaced = 0;
    for_each_criteria_expression_mut(criteria, &mut |expr| {
        if let Expression::Element(e) = expr {
            if let Some(target) = mapping.get(e) {
                *expr = target.clone();
                replaced += 1;
            }
        }
    });
    replaced
}
