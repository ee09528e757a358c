//! Expressions and criteria.

use fedq_core::schema::DataType;
use fedq_core::types::Scalar;
use serde::{Deserialize, Serialize};

use crate::command::Query;
use crate::symbol::ElementSymbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Element(ElementSymbol),
    Constant(Constant),
    Reference(Reference),
    Function(Function),
    SearchedCase(SearchedCaseExpression),
    ScalarSubquery(ScalarSubquery),
}

impl Expression {
    pub fn element(name: &str) -> Self {
        Expression::Element(ElementSymbol::new(name))
    }

    pub fn constant(value: Scalar) -> Self {
        Expression::Constant(Constant { value })
    }

    /// Best-effort static type; `None` until elements are resolved.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Expression::Element(e) => e.data_type,
            Expression::Constant(c) => Some(c.value.data_type()),
            Expression::Reference(r) => r.element.as_ref().and_then(|e| e.data_type),
            Expression::Function(f) => f.data_type,
            Expression::SearchedCase(c) => c.data_type,
            Expression::ScalarSubquery(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&ElementSymbol> {
        match self {
            Expression::Element(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: Scalar,
}

/// Parameter placeholder. Positional (`?`) references carry only an index;
/// references keyed by an element (procedure parameters, correlated values)
/// carry that element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub index: usize,
    pub element: Option<ElementSymbol>,
}

impl Reference {
    pub fn positional(index: usize) -> Self {
        Self {
            index,
            element: None,
        }
    }

    pub fn keyed(element: ElementSymbol) -> Self {
        Self {
            index: 0,
            element: Some(element),
        }
    }
}

/// Function call. Arithmetic and concatenation are functions named by their
/// operator (`+`, `-`, `*`, `/`, `||`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub args: Vec<Expression>,
    pub data_type: Option<DataType>,
}

impl Function {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self {
            name: name.into(),
            args,
            data_type: None,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self.name.as_str(), "+" | "-" | "*" | "/" | "||")
    }
}

/// `CASE WHEN c1 THEN e1 ... [ELSE e] END`; `when` and `then` are parallel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchedCaseExpression {
    pub when: Vec<Criteria>,
    pub then: Vec<Expression>,
    pub else_expression: Option<Box<Expression>>,
    pub data_type: Option<DataType>,
}

impl SearchedCaseExpression {
    pub fn new(when: Vec<Criteria>, then: Vec<Expression>) -> Self {
        Self {
            when,
            then,
            else_expression: None,
            data_type: None,
        }
    }

    pub fn when_count(&self) -> usize {
        self.when.len()
    }

    pub fn when_criteria(&self, index: usize) -> Option<&Criteria> {
        self.when.get(index)
    }

    pub fn then_expression(&self, index: usize) -> Option<&Expression> {
        self.then.get(index)
    }

    pub fn set_else(&mut self, expression: Option<Expression>) {
        self.else_expression = expression.map(Box::new);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarSubquery {
    pub query: Box<Query>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }

    /// Operator with operands swapped (`a < b` == `b > a`).
    pub fn reversed(&self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Le,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Criteria {
    Compare(CompareCriteria),
    IsNull(IsNullCriteria),
    Not(NotCriteria),
    Compound(CompoundCriteria),
    Set(SetCriteria),
    Exists(ExistsCriteria),
    Literal(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareCriteria {
    pub left: Expression,
    pub operator: CompareOp,
    pub right: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsNullCriteria {
    pub expression: Expression,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotCriteria {
    pub criteria: Box<Criteria>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundCriteria {
    pub operator: LogicalOp,
    pub criteria: Vec<Criteria>,
}

/// `expr [NOT] IN (v1, v2, ...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetCriteria {
    pub expression: Expression,
    pub values: Vec<Expression>,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistsCriteria {
    pub query: Box<Query>,
    pub negated: bool,
}

impl Criteria {
    pub fn compare(left: Expression, operator: CompareOp, right: Expression) -> Self {
        Criteria::Compare(CompareCriteria {
            left,
            operator,
            right,
        })
    }

    /// Flatten a conjunction into its conjuncts.
    pub fn separate_conjuncts(self) -> Vec<Criteria> {
        match self {
            Criteria::Compound(CompoundCriteria {
                operator: LogicalOp::And,
                criteria,
            }) => criteria
                .into_iter()
                .flat_map(Criteria::separate_conjuncts)
                .collect(),
            other => vec![other],
        }
    }

    /// AND the given criteria together. `None` for an empty list.
    pub fn combine_conjuncts(mut parts: Vec<Criteria>) -> Option<Criteria> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Criteria::Compound(CompoundCriteria {
                operator: LogicalOp::And,
                criteria: parts,
            })),
        }
    }

    /// True when the criteria contains a nested query anywhere.
    pub fn has_subquery(&self) -> bool {
        fn expr_has(e: &Expression) -> bool {
            match e {
                Expression::ScalarSubquery(_) => true,
                Expression::Function(f) => f.args.iter().any(expr_has),
                Expression::SearchedCase(c) => {
                    c.when.iter().any(Criteria::has_subquery)
                        || c.then.iter().any(expr_has)
                        || c.else_expression.as_deref().map(expr_has).unwrap_or(false)
                }
                _ => false,
            }
        }
        match self {
            Criteria::Compare(c) => expr_has(&c.left) || expr_has(&c.right),
            Criteria::IsNull(c) => expr_has(&c.expression),
            Criteria::Not(n) => n.criteria.has_subquery(),
            Criteria::Compound(c) => c.criteria.iter().any(Criteria::has_subquery),
            Criteria::Set(s) => expr_has(&s.expression) || s.values.iter().any(expr_has),
            Criteria::Exists(_) => true,
            Criteria::Literal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(name: &str, v: i32) -> Criteria {
        Criteria::compare(
            Expression::element(name),
            CompareOp::Eq,
            Expression::constant(Scalar::I32(v)),
        )
    }

    #[test]
    fn conjuncts_flatten_nested_ands() {
        let nested = Criteria::combine_conjuncts(vec![
            eq("a", 1),
            Criteria::combine_conjuncts(vec![eq("b", 2), eq("c", 3)]).unwrap(),
        ])
        .unwrap();
        assert_eq!(nested.separate_conjuncts().len(), 3);
    }

    #[test]
    fn or_is_a_single_conjunct() {
        let or = Criteria::Compound(CompoundCriteria {
            operator: LogicalOp::Or,
            criteria: vec![eq("a", 1), eq("b", 2)],
        });
        assert_eq!(or.separate_conjuncts().len(), 1);
    }

    #[test]
    fn searched_case_accessors() {
        let mut case = SearchedCaseExpression::new(
            vec![eq("a", 1)],
            vec![Expression::constant(Scalar::Str("one".into()))],
        );
        case.set_else(Some(Expression::constant(Scalar::Null)));
        assert_eq!(case.when_count(), 1);
        assert!(case.when_criteria(0).is_some());
        assert!(case.then_expression(1).is_none());
        assert!(case.else_expression.is_some());
    }
}
