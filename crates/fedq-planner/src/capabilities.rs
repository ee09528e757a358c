//! What a source can evaluate itself.
//!
//! The optimizer consults capabilities before moving criteria, joins or
//! projections beneath an `Access` node. Anything not listed stays in the
//! federation layer.

use std::collections::{BTreeSet, HashMap};

use fedq_lang::{CompareOp, Criteria, Expression, JoinType, LogicalOp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCapabilities {
    /// Accepts a WHERE clause at all.
    pub criteria: bool,
    pub compare_equals: bool,
    /// `<`, `>`, `<=`, `>=`, `<>`.
    pub compare_ordered: bool,
    pub in_criteria: bool,
    /// Largest IN list accepted; 0 means no limit.
    pub max_in_criteria_size: usize,
    pub is_null: bool,
    pub or_criteria: bool,
    pub not_criteria: bool,
    pub exists: bool,
    pub scalar_subqueries: bool,
    pub searched_case: bool,
    pub inner_joins: bool,
    pub outer_joins: bool,
    pub full_outer_joins: bool,
    pub select_distinct: bool,
    pub select_expressions: bool,
    pub row_limit: bool,
    /// Lower-case scalar function names, operators included (`+`, `||`).
    pub functions: BTreeSet<String>,
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self::basic()
    }
}

impl SourceCapabilities {
    /// Nothing can be pushed; the source only scans.
    pub fn none() -> Self {
        Self {
            criteria: false,
            compare_equals: false,
            compare_ordered: false,
            in_criteria: false,
            max_in_criteria_size: 0,
            is_null: false,
            or_criteria: false,
            not_criteria: false,
            exists: false,
            scalar_subqueries: false,
            searched_case: false,
            inner_joins: false,
            outer_joins: false,
            full_outer_joins: false,
            select_distinct: false,
            select_expressions: false,
            row_limit: false,
            functions: BTreeSet::new(),
        }
    }

    /// Single-table filters: comparisons, IN, IS NULL, AND/OR/NOT.
    pub fn basic() -> Self {
        Self {
            criteria: true,
            compare_equals: true,
            compare_ordered: true,
            in_criteria: true,
            is_null: true,
            or_criteria: true,
            not_criteria: true,
            ..Self::none()
        }
    }

    /// A full SQL source.
    pub fn full() -> Self {
        Self {
            exists: true,
            scalar_subqueries: true,
            searched_case: true,
            inner_joins: true,
            outer_joins: true,
            full_outer_joins: true,
            select_distinct: true,
            select_expressions: true,
            row_limit: true,
            functions: ["+", "-", "*", "/", "||", "concat", "upper", "lower", "length", "abs"]
                .into_iter()
                .map(String::from)
                .collect(),
            ..Self::basic()
        }
    }

    pub fn with_function(mut self, name: &str) -> Self {
        self.functions.insert(name.to_ascii_lowercase());
        self
    }

    pub fn supports_function(&self, name: &str) -> bool {
        self.functions.contains(&name.to_ascii_lowercase())
    }

    pub fn supports_join(&self, join_type: JoinType) -> bool {
        match join_type {
            JoinType::Inner | JoinType::Cross => self.inner_joins,
            JoinType::LeftOuter | JoinType::RightOuter => self.outer_joins,
            JoinType::FullOuter => self.full_outer_joins,
        }
    }

    pub fn supports_expression(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Element(_) | Expression::Constant(_) | Expression::Reference(_) => true,
            Expression::Function(f) => {
                self.supports_function(&f.name) && f.args.iter().all(|a| self.supports_expression(a))
            }
            Expression::SearchedCase(c) => {
                self.searched_case
                    && c.when.iter().all(|w| self.supports_criteria(w))
                    && c.then.iter().all(|t| self.supports_expression(t))
                    && c.else_expression
                        .as_deref()
                        .map(|e| self.supports_expression(e))
                        .unwrap_or(true)
            }
            Expression::ScalarSubquery(_) => self.scalar_subqueries,
        }
    }

    /// Whether the whole predicate can be evaluated by the source.
    pub fn supports_criteria(&self, criteria: &Criteria) -> bool {
        if !self.criteria {
            return false;
        }
        match criteria {
            Criteria::Compare(c) => {
                let op_ok = match c.operator {
                    CompareOp::Eq => self.compare_equals,
                    _ => self.compare_ordered,
                };
                op_ok && self.supports_expression(&c.left) && self.supports_expression(&c.right)
            }
            Criteria::IsNull(c) => self.is_null && self.supports_expression(&c.expression),
            Criteria::Not(n) => self.not_criteria && self.supports_criteria(&n.criteria),
            Criteria::Compound(c) => {
                (c.operator == LogicalOp::And || self.or_criteria)
                    && c.criteria.iter().all(|p| self.supports_criteria(p))
            }
            Criteria::Set(s) => {
                self.in_criteria
                    && (self.max_in_criteria_size == 0 || s.values.len() <= self.max_in_criteria_size)
                    && self.supports_expression(&s.expression)
                    && s.values.iter().all(|v| self.supports_expression(v))
            }
            Criteria::Exists(_) => self.exists,
            Criteria::Literal(_) => true,
        }
    }
}

/// Looks up the capabilities of the source behind a model.
pub trait CapabilitiesFinder {
    fn find_capabilities(&self, model: &str) -> SourceCapabilities;
}

/// Fixed per-model capabilities with a fallback.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    default: SourceCapabilities,
    models: HashMap<String, SourceCapabilities>,
}

impl StaticCapabilities {
    pub fn new(default: SourceCapabilities) -> Self {
        Self {
            default,
            models: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: &str, caps: SourceCapabilities) -> Self {
        self.models.insert(model.to_ascii_lowercase(), caps);
        self
    }
}

impl CapabilitiesFinder for StaticCapabilities {
    fn find_capabilities(&self, model: &str) -> SourceCapabilities {
        self.models
            .get(&model.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_lang::QueryParser;

    fn crit(text: &str) -> Criteria {
        QueryParser::parse_criteria(text).unwrap()
    }

    #[test]
    fn basic_sources_take_simple_filters_only() {
        let caps = SourceCapabilities::basic();
        assert!(caps.supports_criteria(&crit("e1 = 1 OR e2 IN (1, 2)")));
        assert!(caps.supports_criteria(&crit("NOT (e1 IS NULL)")));
        assert!(!caps.supports_criteria(&crit("upper(e1) = 'A'")));
        assert!(!caps.supports_criteria(&crit("e1 + 1 = 2")));
        assert!(caps.clone().with_function("+").supports_criteria(&crit("e1 + 1 = 2")));
    }

    #[test]
    fn none_rejects_everything() {
        assert!(!SourceCapabilities::none().supports_criteria(&crit("e1 = 1")));
    }

    #[test]
    fn in_list_size_limit() {
        let caps = SourceCapabilities {
            max_in_criteria_size: 2,
            ..SourceCapabilities::basic()
        };
        assert!(caps.supports_criteria(&crit("e1 IN (1, 2)")));
        assert!(!caps.supports_criteria(&crit("e1 IN (1, 2, 3)")));
    }

    #[test]
    fn static_finder_falls_back() {
        let finder = StaticCapabilities::new(SourceCapabilities::none())
            .with_model("PM1", SourceCapabilities::full());
        assert!(finder.find_capabilities("pm1").inner_joins);
        assert!(!finder.find_capabilities("pm2").criteria);
    }
}
