//! Row-at-a-time expression and criteria evaluation.
//!
//! Criteria follow SQL three-valued logic: `Some(true)`, `Some(false)` or
//! `None` for UNKNOWN. A row passes a filter only on `Some(true)`.

use std::cmp::Ordering;

use fedq_core::types::Scalar;
use fedq_lang::{
    CompareOp, Criteria, ElementSymbol, Expression, Function, LogicalOp, SearchedCaseExpression,
};

use crate::context::Bindings;
use crate::error::{ExecError, Result};

/// Positional view of one row: `elements[i]` names `row[i]`.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub elements: &'a [ElementSymbol],
    pub row: &'a [Scalar],
}

impl<'a> RowView<'a> {
    pub fn new(elements: &'a [ElementSymbol], row: &'a [Scalar]) -> Self {
        Self { elements, row }
    }

    /// A view with no columns, for constant expressions.
    pub fn empty() -> RowView<'static> {
        RowView {
            elements: &[],
            row: &[],
        }
    }

    fn lookup(&self, element: &ElementSymbol) -> Option<&'a Scalar> {
        let pos = self.elements.iter().position(|e| e == element).or_else(|| {
            // unqualified lookups match on short name alone
            if element.group.is_none() {
                self.elements
                    .iter()
                    .position(|e| e.short_name.eq_ignore_ascii_case(&element.short_name))
            } else {
                None
            }
        })?;
        self.row.get(pos)
    }
}

pub fn evaluate(expr: &Expression, view: RowView<'_>, bindings: &Bindings) -> Result<Scalar> {
    match expr {
        Expression::Constant(c) => Ok(c.value.clone()),
        Expression::Element(e) => view
            .lookup(e)
            .cloned()
            .ok_or_else(|| ExecError::Evaluation(format!("element {} is not in scope", e))),
        Expression::Reference(r) => bindings.lookup(r).cloned().ok_or_else(|| {
            ExecError::MissingBinding(match &r.element {
                Some(e) => e.name(),
                None => format!("?{}", r.index),
            })
        }),
        Expression::Function(f) => evaluate_function(f, view, bindings),
        Expression::SearchedCase(c) => evaluate_case(c, view, bindings),
        Expression::ScalarSubquery(_) => Err(ExecError::Unsupported(
            "scalar subqueries are only evaluated by the source they are pushed to".into(),
        )),
    }
}

pub fn evaluate_criteria(
    criteria: &Criteria,
    view: RowView<'_>,
    bindings: &Bindings,
) -> Result<Option<bool>> {
    match criteria {
        Criteria::Literal(b) => Ok(Some(*b)),
        Criteria::Compare(c) => {
            let left = evaluate(&c.left, view, bindings)?;
            let right = evaluate(&c.right, view, bindings)?;
            Ok(left.sql_cmp(&right).map(|ord| compare_holds(c.operator, ord)))
        }
        Criteria::IsNull(c) => {
            let v = evaluate(&c.expression, view, bindings)?;
            Ok(Some(v.is_null() != c.negated))
        }
        Criteria::Not(n) => Ok(evaluate_criteria(&n.criteria, view, bindings)?.map(|b| !b)),
        Criteria::Compound(c) => {
            let mut unknown = false;
            for part in &c.criteria {
                match (c.operator, evaluate_criteria(part, view, bindings)?) {
                    (LogicalOp::And, Some(false)) => return Ok(Some(false)),
                    (LogicalOp::Or, Some(true)) => return Ok(Some(true)),
                    (_, None) => unknown = true,
                    _ => {}
                }
            }
            if unknown {
                Ok(None)
            } else {
                Ok(Some(c.operator == LogicalOp::And))
            }
        }
        Criteria::Set(s) => {
            let v = evaluate(&s.expression, view, bindings)?;
            if v.is_null() {
                return Ok(None);
            }
            let mut unknown = false;
            for candidate in &s.values {
                match v.sql_cmp(&evaluate(candidate, view, bindings)?) {
                    Some(Ordering::Equal) => return Ok(Some(!s.negated)),
                    None => unknown = true,
                    _ => {}
                }
            }
            if unknown {
                Ok(None)
            } else {
                Ok(Some(s.negated))
            }
        }
        Criteria::Exists(_) => Err(ExecError::Unsupported(
            "EXISTS is only evaluated by the source it is pushed to".into(),
        )),
    }
}

/// True only when the criteria evaluates to TRUE.
pub fn passes(criteria: &Criteria, view: RowView<'_>, bindings: &Bindings) -> Result<bool> {
    Ok(evaluate_criteria(criteria, view, bindings)? == Some(true))
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

fn evaluate_case(
    case: &SearchedCaseExpression,
    view: RowView<'_>,
    bindings: &Bindings,
) -> Result<Scalar> {
    for (when, then) in case.when.iter().zip(&case.then) {
        if passes(when, view, bindings)? {
            return evaluate(then, view, bindings);
        }
    }
    match &case.else_expression {
        Some(e) => evaluate(e, view, bindings),
        None => Ok(Scalar::Null),
    }
}

fn evaluate_function(f: &Function, view: RowView<'_>, bindings: &Bindings) -> Result<Scalar> {
    let name = f.name.to_ascii_lowercase();
    // coalesce-style functions must see nulls
    if matches!(name.as_str(), "coalesce" | "ifnull" | "nvl") {
        for arg in &f.args {
            let v = evaluate(arg, view, bindings)?;
            if !v.is_null() {
                return Ok(v);
            }
        }
        return Ok(Scalar::Null);
    }

    let args = f
        .args
        .iter()
        .map(|a| evaluate(a, view, bindings))
        .collect::<Result<Vec<_>>>()?;

    if name == "nullif" {
        let [a, b] = two(&name, &args)?;
        return Ok(match a.sql_cmp(b) {
            Some(Ordering::Equal) => Scalar::Null,
            _ => a.clone(),
        });
    }
    if args.iter().any(Scalar::is_null) {
        return Ok(Scalar::Null);
    }

    match name.as_str() {
        "+" | "-" | "*" | "/" => {
            let [a, b] = two(&name, &args)?;
            arithmetic(&name, a, b)
        }
        "||" | "concat" => Ok(Scalar::Str(args.iter().map(|a| a.to_string()).collect())),
        "upper" | "ucase" => Ok(Scalar::Str(one(&name, &args)?.to_string().to_uppercase())),
        "lower" | "lcase" => Ok(Scalar::Str(one(&name, &args)?.to_string().to_lowercase())),
        "trim" => Ok(Scalar::Str(one(&name, &args)?.to_string().trim().to_string())),
        "length" => {
            let len = one(&name, &args)?.to_string().chars().count();
            Ok(Scalar::I32(i32::try_from(len).unwrap_or(i32::MAX)))
        }
        "abs" => match one(&name, &args)? {
            Scalar::I32(v) => v
                .checked_abs()
                .map(Scalar::I32)
                .ok_or_else(|| overflow(&name)),
            Scalar::I64(v) => v
                .checked_abs()
                .map(Scalar::I64)
                .ok_or_else(|| overflow(&name)),
            Scalar::F32(v) => Ok(Scalar::F32(v.abs())),
            Scalar::F64(v) => Ok(Scalar::F64(v.abs())),
            other => Err(ExecError::Evaluation(format!("abs of non-numeric {}", other))),
        },
        "substring" => substring(&args),
        _ => Err(ExecError::Unsupported(format!("function {}", f.name))),
    }
}

fn one<'a>(name: &str, args: &'a [Scalar]) -> Result<&'a Scalar> {
    match args {
        [a] => Ok(a),
        _ => Err(arity(name, 1, args.len())),
    }
}

fn two<'a>(name: &str, args: &'a [Scalar]) -> Result<[&'a Scalar; 2]> {
    match args {
        [a, b] => Ok([a, b]),
        _ => Err(arity(name, 2, args.len())),
    }
}

fn arity(name: &str, expected: usize, got: usize) -> ExecError {
    ExecError::Evaluation(format!("{} expects {} arguments, got {}", name, expected, got))
}

fn overflow(name: &str) -> ExecError {
    ExecError::Evaluation(format!("numeric overflow in {}", name))
}

fn arithmetic(op: &str, a: &Scalar, b: &Scalar) -> Result<Scalar> {
    use Scalar::*;
    let integral = matches!(a, I32(_) | I64(_)) && matches!(b, I32(_) | I64(_));
    if integral {
        let (x, y) = match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(ExecError::Evaluation(format!("{} {} {}", a, op, b))),
        };
        let out = match op {
            "+" => x.checked_add(y),
            "-" => x.checked_sub(y),
            "*" => x.checked_mul(y),
            _ if y == 0 => return Err(ExecError::Evaluation("division by zero".into())),
            _ => x.checked_div(y),
        }
        .ok_or_else(|| overflow(op))?;
        // stay in i32 when both inputs were
        if matches!((a, b), (I32(_), I32(_))) {
            if let Ok(v) = i32::try_from(out) {
                return Ok(I32(v));
            }
        }
        return Ok(I64(out));
    }
    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(ExecError::Evaluation(format!(
                "non-numeric operands for {}: {}, {}",
                op, a, b
            )))
        }
    };
    match op {
        "+" => Ok(F64(x + y)),
        "-" => Ok(F64(x - y)),
        "*" => Ok(F64(x * y)),
        _ if y == 0.0 => Err(ExecError::Evaluation("division by zero".into())),
        _ => Ok(F64(x / y)),
    }
}

/// `substring(s, start[, length])`, 1-based.
fn substring(args: &[Scalar]) -> Result<Scalar> {
    let (s, start, len) = match args {
        [s, start] => (s, start, None),
        [s, start, len] => (s, start, Some(len)),
        _ => return Err(arity("substring", 2, args.len())),
    };
    let text = s.to_string();
    let start = start
        .as_i64()
        .ok_or_else(|| ExecError::Evaluation("substring start must be numeric".into()))?;
    let skip = usize::try_from(start.max(1) - 1).unwrap_or(0);
    let chars = text.chars().skip(skip);
    let out: String = match len {
        Some(l) => {
            let l = l
                .as_i64()
                .ok_or_else(|| ExecError::Evaluation("substring length must be numeric".into()))?;
            chars.take(usize::try_from(l.max(0)).unwrap_or(0)).collect()
        }
        None => chars.collect(),
    };
    Ok(Scalar::Str(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_lang::{QueryParser, Reference};

    fn elems() -> Vec<ElementSymbol> {
        vec![ElementSymbol::new("g.a"), ElementSymbol::new("g.b")]
    }

    fn check(text: &str, row: &[Scalar]) -> Option<bool> {
        let crit = QueryParser::parse_criteria(text).unwrap();
        let e = elems();
        evaluate_criteria(&crit, RowView::new(&e, row), &Bindings::new()).unwrap()
    }

    #[test]
    fn three_valued_logic() {
        let row = [Scalar::Null, Scalar::I32(2)];
        assert_eq!(check("g.a = 1", &row), None);
        assert_eq!(check("g.a = 1 OR g.b = 2", &row), Some(true));
        assert_eq!(check("g.a = 1 AND g.b = 3", &row), Some(false));
        assert_eq!(check("NOT (g.a = 1)", &row), None);
        assert_eq!(check("g.a IS NULL", &row), Some(true));
        assert_eq!(check("g.b NOT IN (1, 3)", &row), Some(true));
        assert_eq!(check("g.b IN (1, g.a)", &row), None);
    }

    #[test]
    fn arithmetic_and_functions() {
        let e = elems();
        let row = [Scalar::Str("ab".into()), Scalar::I32(7)];
        let view = RowView::new(&e, &row);
        let eval = |sql: &str| {
            let expr = QueryParser::parse_expression(sql).unwrap();
            evaluate(&expr, view, &Bindings::new())
        };
        assert_eq!(eval("g.b + 1").unwrap(), Scalar::I32(8));
        assert_eq!(eval("upper(g.a) || 'c'").unwrap(), Scalar::Str("ABc".into()));
        assert_eq!(eval("coalesce(null, g.b)").unwrap(), Scalar::I32(7));
        assert_eq!(eval("length(g.a)").unwrap(), Scalar::I32(2));
        assert!(matches!(eval("g.b / 0"), Err(ExecError::Evaluation(_))));
        assert_eq!(
            eval("CASE WHEN g.b > 5 THEN 'big' ELSE 'small' END").unwrap(),
            Scalar::Str("big".into())
        );
    }

    #[test]
    fn unbound_reference_is_reported() {
        let expr = Expression::Reference(Reference::positional(0));
        let err = evaluate(&expr, RowView::empty(), &Bindings::new()).unwrap_err();
        assert!(matches!(err, ExecError::MissingBinding(ref name) if name == "?0"));
        let bound = Bindings::positional(vec![Scalar::I64(3)]);
        assert_eq!(evaluate(&expr, RowView::empty(), &bound).unwrap(), Scalar::I64(3));
    }
}
