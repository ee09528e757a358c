//! Canonical SQL rendering of language objects.
//!
//! Keywords are upper case; identifiers are rendered as written. The output
//! parses back to an equivalent tree, and it is what connectors receive as the
//! text form of a pushed-down command.

use std::fmt::{self, Display, Formatter, Write as _};

use fedq_core::types::Scalar;

use crate::command::*;
use crate::expr::*;

fn join<T: Display>(f: &mut Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.value {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Bool(true) => f.write_str("TRUE"),
            Scalar::Bool(false) => f.write_str("FALSE"),
            Scalar::Str(s) => f.write_str(&quote_string(s)),
            other => write!(f, "{}", other),
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.element {
            Some(e) => write!(f, "{}", e),
            None => f.write_char('?'),
        }
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_operator() && self.args.len() == 2 {
            return write!(f, "({} {} {})", self.args[0], self.name, self.args[1]);
        }
        write!(f, "{}(", self.name)?;
        join(f, &self.args, ", ")?;
        f.write_char(')')
    }
}

impl Display for SearchedCaseExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("CASE")?;
        for (when, then) in self.when.iter().zip(self.then.iter()) {
            write!(f, " WHEN {} THEN {}", when, then)?;
        }
        if let Some(e) = &self.else_expression {
            write!(f, " ELSE {}", e)?;
        }
        f.write_str(" END")
    }
}

impl Display for ScalarSubquery {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.query)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Element(e) => write!(f, "{}", e),
            Expression::Constant(c) => write!(f, "{}", c),
            Expression::Reference(r) => write!(f, "{}", r),
            Expression::Function(func) => write!(f, "{}", func),
            Expression::SearchedCase(c) => write!(f, "{}", c),
            Expression::ScalarSubquery(s) => write!(f, "{}", s),
        }
    }
}

impl Display for Criteria {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::Compare(c) => write!(f, "{} {} {}", c.left, c.operator.symbol(), c.right),
            Criteria::IsNull(c) => {
                let not = if c.negated { " NOT" } else { "" };
                write!(f, "{} IS{} NULL", c.expression, not)
            }
            Criteria::Not(n) => write!(f, "NOT ({})", n.criteria),
            Criteria::Compound(c) => {
                let op = match c.operator {
                    LogicalOp::And => " AND ",
                    LogicalOp::Or => " OR ",
                };
                for (i, part) in c.criteria.iter().enumerate() {
                    if i > 0 {
                        f.write_str(op)?;
                    }
                    match part {
                        Criteria::Compound(_) => write!(f, "({})", part)?,
                        _ => write!(f, "{}", part)?,
                    }
                }
                Ok(())
            }
            Criteria::Set(s) => {
                let not = if s.negated { " NOT" } else { "" };
                write!(f, "{}{} IN (", s.expression, not)?;
                join(f, &s.values, ", ")?;
                f.write_char(')')
            }
            Criteria::Exists(e) => {
                let not = if e.negated { "NOT " } else { "" };
                write!(f, "{}EXISTS ({})", not, e.query)
            }
            Criteria::Literal(true) => f.write_str("1 = 1"),
            Criteria::Literal(false) => f.write_str("1 = 0"),
        }
    }
}

impl Display for SelectSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SelectSymbol::All(AllSymbol { group: None }) => f.write_char('*'),
            SelectSymbol::All(AllSymbol { group: Some(g) }) => write!(f, "{}.*", g),
            SelectSymbol::Expression(e) => match &e.alias {
                Some(alias) => write!(f, "{} AS {}", e.expression, alias),
                None => write!(f, "{}", e.expression),
            },
        }
    }
}

impl Display for FromClause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FromClause::Unary(u) => write!(f, "{}", u.group),
            FromClause::Subquery(s) => write!(f, "({}) AS {}", s.command, s.group.name),
            FromClause::Join(j) => {
                write!(f, "{} {} ", j.left, j.join_type.sql())?;
                match &*j.right {
                    FromClause::Join(_) => write!(f, "({})", j.right)?,
                    other => write!(f, "{}", other)?,
                }
                if !j.criteria.is_empty() {
                    f.write_str(" ON ")?;
                    join(f, &j.criteria, " AND ")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.select.distinct {
            f.write_str("DISTINCT ")?;
        }
        join(f, &self.select.symbols, ", ")?;
        if let Some(into) = &self.into {
            write!(f, " INTO {}", into.group)?;
        }
        if let Some(from) = &self.from {
            f.write_str(" FROM ")?;
            join(f, &from.clauses, ", ")?;
        }
        if let Some(criteria) = &self.criteria {
            write!(f, " WHERE {}", criteria)?;
        }
        if let Some(limit) = &self.limit {
            if limit.offset > 0 {
                write!(f, " LIMIT {}, {}", limit.offset, limit.row_limit)?;
            } else {
                write!(f, " LIMIT {}", limit.row_limit)?;
            }
        }
        Ok(())
    }
}

impl Display for StoredProcedure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EXEC {}(", self.group.name)?;
        join(f, &self.parameters, ", ")?;
        f.write_char(')')
    }
}

impl Display for Insert {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "INSERT INTO {}", self.group.name)?;
        if !self.columns.is_empty() {
            f.write_str(" (")?;
            // Inserted columns are rendered by short name.
            for (i, c) in self.columns.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(&c.short_name)?;
            }
            f.write_char(')')?;
        }
        f.write_str(" VALUES (")?;
        join(f, &self.values, ", ")?;
        f.write_char(')')
    }
}

impl Display for Update {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {} SET ", self.group.name)?;
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = {}", change.symbol.short_name, change.value)?;
        }
        if let Some(c) = &self.criteria {
            write!(f, " WHERE {}", c)?;
        }
        Ok(())
    }
}

impl Display for Delete {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {}", self.group.name)?;
        if let Some(c) = &self.criteria {
            write!(f, " WHERE {}", c)?;
        }
        Ok(())
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.atomic {
            f.write_str("BEGIN ATOMIC\n")?;
        } else {
            f.write_str("BEGIN\n")?;
        }
        for statement in &self.statements {
            writeln!(f, "{};", statement)?;
        }
        f.write_str("END")
    }
}

impl Display for CreateProcedure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE VIRTUAL PROCEDURE {}", self.block)
    }
}

impl Display for TriggerAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "FOR EACH ROW\n{}", self.block)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Command::Query(c) => write!(f, "{}", c),
            Command::StoredProcedure(c) => write!(f, "{}", c),
            Command::Insert(c) => write!(f, "{}", c),
            Command::Update(c) => write!(f, "{}", c),
            Command::Delete(c) => write!(f, "{}", c),
            Command::Block(c) => write!(f, "{}", c),
            Command::CreateProcedure(c) => write!(f, "{}", c),
            Command::TriggerAction(c) => write!(f, "{}", c),
        }
    }
}
