//! Recursive-descent parser for the command subset the engine plans.
//!
//! Supported: SELECT [DISTINCT] ... [INTO] [FROM with joins and inline views]
//! [WHERE] [LIMIT]; EXEC/CALL; INSERT ... VALUES; UPDATE; DELETE; BEGIN/END
//! blocks; virtual procedure bodies and trigger actions. Criteria support
//! comparison, IS [NOT] NULL, [NOT] IN lists, BETWEEN, EXISTS, AND/OR/NOT.

use fedq_core::types::Scalar;
use sqlparser::tokenizer::Token;

use crate::command::*;
use crate::error::Result;
use crate::expr::*;
use crate::symbol::{ElementSymbol, GroupSymbol};
use crate::token::TokenStream;

/// Words that end an expression and therefore can never be implicit aliases.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "ON",
    "LIMIT", "OFFSET", "INTO", "UNION", "ORDER", "GROUP", "HAVING", "AND", "OR", "NOT", "AS", "IS",
    "IN", "EXISTS", "END", "THEN", "WHEN", "ELSE", "VALUES", "SET", "BEGIN", "CREATE", "BETWEEN",
    "LIKE",
];

pub struct QueryParser;

impl QueryParser {
    /// Parse exactly one command (a trailing `;` is allowed).
    pub fn parse_command(sql: &str) -> Result<Command> {
        let mut ts = TokenStream::tokenize(sql)?;
        let command = Parser::new(&mut ts).parse_command()?;
        ts.consume_token(&Token::SemiColon);
        if !ts.is_eof() {
            return Err(ts.unexpected("end of command"));
        }
        Ok(command)
    }

    pub fn parse_query(sql: &str) -> Result<Query> {
        match Self::parse_command(sql)? {
            Command::Query(q) => Ok(q),
            other => Err(crate::error::ParseError::syntax(
                0,
                format!("expected a query but found a {}", other.kind()),
            )),
        }
    }

    pub fn parse_criteria(sql: &str) -> Result<Criteria> {
        let mut ts = TokenStream::tokenize(sql)?;
        let criteria = Parser::new(&mut ts).parse_criteria()?;
        if !ts.is_eof() {
            return Err(ts.unexpected("end of criteria"));
        }
        Ok(criteria)
    }

    pub fn parse_expression(sql: &str) -> Result<Expression> {
        let mut ts = TokenStream::tokenize(sql)?;
        let expr = Parser::new(&mut ts).parse_expression()?;
        if !ts.is_eof() {
            return Err(ts.unexpected("end of expression"));
        }
        Ok(expr)
    }
}

pub struct Parser<'a> {
    ts: &'a mut TokenStream,
    next_parameter: usize,
}

impl<'a> Parser<'a> {
    pub fn new(ts: &'a mut TokenStream) -> Self {
        Self {
            ts,
            next_parameter: 0,
        }
    }

    pub fn parse_command(&mut self) -> Result<Command> {
        if self.ts.peek_keyword("SELECT") || self.ts.peek_token(&Token::LParen) {
            return Ok(Command::Query(self.parse_query_expression()?));
        }
        if self.ts.consume_keyword("EXEC")
            || self.ts.consume_keyword("EXECUTE")
            || self.ts.consume_keyword("CALL")
        {
            return self.parse_stored_procedure().map(Command::StoredProcedure);
        }
        if self.ts.peek_keyword("INSERT") {
            return self.parse_insert().map(Command::Insert);
        }
        if self.ts.peek_keyword("UPDATE") {
            return self.parse_update().map(Command::Update);
        }
        if self.ts.peek_keyword("DELETE") {
            return self.parse_delete().map(Command::Delete);
        }
        if self.ts.peek_keyword("BEGIN") {
            return self.parse_block().map(Command::Block);
        }
        if self.ts.consume_keywords(&["CREATE", "VIRTUAL", "PROCEDURE"])
            || self.ts.consume_keywords(&["CREATE", "PROCEDURE"])
        {
            let block = self.parse_block()?;
            return Ok(Command::CreateProcedure(CreateProcedure { block }));
        }
        if self.ts.consume_keywords(&["FOR", "EACH", "ROW"]) {
            let block = self.parse_block()?;
            return Ok(Command::TriggerAction(TriggerAction { block }));
        }
        Err(self.ts.unexpected("command"))
    }

    fn parse_query_expression(&mut self) -> Result<Query> {
        if self.ts.consume_token(&Token::LParen) {
            let q = self.parse_query_expression()?;
            self.ts.expect_token(&Token::RParen)?;
            return Ok(q);
        }
        self.parse_query()
    }

    pub fn parse_block(&mut self) -> Result<Block> {
        self.ts.expect_keyword("BEGIN")?;
        let atomic = self.ts.consume_keyword("ATOMIC");
        let mut statements = Vec::new();
        while !self.ts.consume_keyword("END") {
            if self.ts.is_eof() {
                return Err(self.ts.error("unterminated block; expected END"));
            }
            if self.ts.consume_token(&Token::SemiColon) {
                continue;
            }
            statements.push(self.parse_command()?);
        }
        Ok(Block { atomic, statements })
    }

    pub fn parse_query(&mut self) -> Result<Query> {
        self.ts.expect_keyword("SELECT")?;
        let distinct = self.ts.consume_keyword("DISTINCT");
        if !distinct {
            self.ts.consume_keyword("ALL");
        }
        let mut symbols = vec![self.parse_select_symbol()?];
        while self.ts.consume_token(&Token::Comma) {
            symbols.push(self.parse_select_symbol()?);
        }
        let into = if self.ts.consume_keyword("INTO") {
            Some(IntoClause {
                group: GroupSymbol::new(self.ts.parse_qualified_name()?),
            })
        } else {
            None
        };
        let from = if self.ts.consume_keyword("FROM") {
            let mut clauses = vec![self.parse_from_item()?];
            while self.ts.consume_token(&Token::Comma) {
                clauses.push(self.parse_from_item()?);
            }
            Some(FromList { clauses })
        } else {
            None
        };
        let criteria = if self.ts.consume_keyword("WHERE") {
            Some(self.parse_criteria()?)
        } else {
            None
        };
        let limit = if self.ts.consume_keyword("LIMIT") {
            let first = self.parse_unsigned()?;
            if self.ts.consume_token(&Token::Comma) {
                let row_limit = self.parse_unsigned()?;
                Some(Limit {
                    offset: first,
                    row_limit,
                })
            } else if self.ts.consume_keyword("OFFSET") {
                let offset = self.parse_unsigned()?;
                Some(Limit {
                    offset,
                    row_limit: first,
                })
            } else {
                Some(Limit {
                    offset: 0,
                    row_limit: first,
                })
            }
        } else {
            None
        };
        Ok(Query {
            select: Select { distinct, symbols },
            into,
            from,
            criteria,
            limit,
        })
    }

    fn parse_unsigned(&mut self) -> Result<u64> {
        match self.ts.next_token() {
            Some(Token::Number(n, _)) => n
                .parse::<u64>()
                .map_err(|_| self.ts.error(format!("invalid row count '{}'", n))),
            _ => Err(self.ts.error("expected an unsigned integer")),
        }
    }

    fn parse_select_symbol(&mut self) -> Result<SelectSymbol> {
        if self.ts.consume_token(&Token::Mul) {
            return Ok(SelectSymbol::All(AllSymbol { group: None }));
        }
        if matches!(self.ts.peek(), Some(Token::Word(_))) {
            let start = self.ts.position();
            let name = self.ts.parse_qualified_name()?;
            if self.ts.peek_token(&Token::Period) && self.ts.peek_nth(1) == Some(&Token::Mul) {
                self.ts.next_token();
                self.ts.next_token();
                return Ok(SelectSymbol::All(AllSymbol { group: Some(name) }));
            }
            self.ts.reset(start);
        }
        let expression = self.parse_expression()?;
        let alias = self.parse_optional_alias()?;
        Ok(SelectSymbol::Expression(ExpressionSymbol { expression, alias }))
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.ts.consume_keyword("AS") {
            return self.ts.parse_identifier().map(Some);
        }
        match self.ts.peek() {
            Some(Token::Word(w)) if w.quote_style.is_some() => self.ts.parse_identifier().map(Some),
            Some(Token::Word(_)) if !self.ts.peek_any_keyword(RESERVED) => {
                self.ts.parse_identifier().map(Some)
            }
            _ => Ok(None),
        }
    }

    fn parse_from_item(&mut self) -> Result<FromClause> {
        let mut left = self.parse_from_primary()?;
        loop {
            let join_type = if self.ts.consume_keywords(&["CROSS", "JOIN"]) {
                JoinType::Cross
            } else if self.ts.consume_keywords(&["INNER", "JOIN"]) || self.ts.consume_keyword("JOIN")
            {
                JoinType::Inner
            } else if self.ts.consume_keywords(&["LEFT", "OUTER", "JOIN"])
                || self.ts.consume_keywords(&["LEFT", "JOIN"])
            {
                JoinType::LeftOuter
            } else if self.ts.consume_keywords(&["RIGHT", "OUTER", "JOIN"])
                || self.ts.consume_keywords(&["RIGHT", "JOIN"])
            {
                JoinType::RightOuter
            } else if self.ts.consume_keywords(&["FULL", "OUTER", "JOIN"])
                || self.ts.consume_keywords(&["FULL", "JOIN"])
            {
                JoinType::FullOuter
            } else {
                return Ok(left);
            };
            let right = self.parse_from_primary()?;
            let criteria = if join_type == JoinType::Cross {
                Vec::new()
            } else {
                self.ts.expect_keyword("ON")?;
                self.parse_criteria()?.separate_conjuncts()
            };
            left = FromClause::Join(JoinPredicate {
                left: Box::new(left),
                right: Box::new(right),
                join_type,
                criteria,
            });
        }
    }

    fn parse_from_primary(&mut self) -> Result<FromClause> {
        if self.ts.consume_token(&Token::LParen) {
            if self.ts.peek_keyword("SELECT") {
                let command = self.parse_query()?;
                self.ts.expect_token(&Token::RParen)?;
                let alias = match self.parse_optional_alias()? {
                    Some(a) => a,
                    None => return Err(self.ts.error("inline view requires an alias")),
                };
                return Ok(FromClause::Subquery(SubqueryFromClause {
                    group: GroupSymbol::new(alias),
                    command: Box::new(command),
                }));
            }
            let inner = self.parse_from_item()?;
            self.ts.expect_token(&Token::RParen)?;
            return Ok(inner);
        }
        let name = self.ts.parse_qualified_name()?;
        let group = match self.parse_optional_alias()? {
            Some(alias) => GroupSymbol::aliased(alias, name),
            None => GroupSymbol::new(name),
        };
        Ok(FromClause::unary(group))
    }

    fn parse_stored_procedure(&mut self) -> Result<StoredProcedure> {
        let name = self.ts.parse_qualified_name()?;
        self.ts.expect_token(&Token::LParen)?;
        let parameters = self.parse_expression_list_until_rparen()?;
        Ok(StoredProcedure {
            group: GroupSymbol::new(name),
            parameters,
        })
    }

    fn parse_expression_list_until_rparen(&mut self) -> Result<Vec<Expression>> {
        let mut items = Vec::new();
        if self.ts.consume_token(&Token::RParen) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if self.ts.consume_token(&Token::RParen) {
                return Ok(items);
            }
            self.ts.expect_token(&Token::Comma)?;
        }
    }

    fn parse_insert(&mut self) -> Result<Insert> {
        self.ts.expect_keyword("INSERT")?;
        self.ts.expect_keyword("INTO")?;
        let group = GroupSymbol::new(self.ts.parse_qualified_name()?);
        let mut columns = Vec::new();
        if self.ts.consume_token(&Token::LParen) {
            loop {
                columns.push(ElementSymbol::new(self.ts.parse_qualified_name()?));
                if self.ts.consume_token(&Token::RParen) {
                    break;
                }
                self.ts.expect_token(&Token::Comma)?;
            }
        }
        self.ts.expect_keyword("VALUES")?;
        self.ts.expect_token(&Token::LParen)?;
        let values = self.parse_expression_list_until_rparen()?;
        Ok(Insert {
            group,
            columns,
            values,
        })
    }

    fn parse_update(&mut self) -> Result<Update> {
        self.ts.expect_keyword("UPDATE")?;
        let group = GroupSymbol::new(self.ts.parse_qualified_name()?);
        self.ts.expect_keyword("SET")?;
        let mut changes = Vec::new();
        loop {
            let symbol = ElementSymbol::new(self.ts.parse_qualified_name()?);
            self.ts.expect_token(&Token::Eq)?;
            let value = self.parse_expression()?;
            changes.push(SetClause { symbol, value });
            if !self.ts.consume_token(&Token::Comma) {
                break;
            }
        }
        let criteria = if self.ts.consume_keyword("WHERE") {
            Some(self.parse_criteria()?)
        } else {
            None
        };
        Ok(Update {
            group,
            changes,
            criteria,
        })
    }

    fn parse_delete(&mut self) -> Result<Delete> {
        self.ts.expect_keyword("DELETE")?;
        self.ts.expect_keyword("FROM")?;
        let group = GroupSymbol::new(self.ts.parse_qualified_name()?);
        let criteria = if self.ts.consume_keyword("WHERE") {
            Some(self.parse_criteria()?)
        } else {
            None
        };
        Ok(Delete { group, criteria })
    }

    // ----- criteria -----

    pub fn parse_criteria(&mut self) -> Result<Criteria> {
        let mut parts = vec![self.parse_and()?];
        while self.ts.consume_keyword("OR") {
            parts.push(self.parse_and()?);
        }
        Ok(compound(LogicalOp::Or, parts))
    }

    fn parse_and(&mut self) -> Result<Criteria> {
        let mut parts = vec![self.parse_not()?];
        while self.ts.consume_keyword("AND") {
            parts.push(self.parse_not()?);
        }
        Ok(compound(LogicalOp::And, parts))
    }

    fn parse_not(&mut self) -> Result<Criteria> {
        if self.ts.consume_keyword("NOT") {
            if self.ts.peek_keyword("EXISTS") {
                return self.parse_exists(true);
            }
            let inner = self.parse_not()?;
            return Ok(Criteria::Not(NotCriteria {
                criteria: Box::new(inner),
            }));
        }
        self.parse_predicate()
    }

    fn parse_exists(&mut self, negated: bool) -> Result<Criteria> {
        self.ts.expect_keyword("EXISTS")?;
        self.ts.expect_token(&Token::LParen)?;
        let query = self.parse_query()?;
        self.ts.expect_token(&Token::RParen)?;
        Ok(Criteria::Exists(ExistsCriteria {
            query: Box::new(query),
            negated,
        }))
    }

    fn parse_predicate(&mut self) -> Result<Criteria> {
        if self.ts.peek_keyword("EXISTS") {
            return self.parse_exists(false);
        }
        if self.ts.peek_token(&Token::LParen) && !self.ts.peek_nth_keyword(1, "SELECT") {
            let start = self.ts.position();
            self.ts.next_token();
            if let Ok(inner) = self.parse_criteria() {
                if self.ts.consume_token(&Token::RParen) && !self.peek_expression_continuation() {
                    return Ok(inner);
                }
            }
            self.ts.reset(start);
        }

        let left = self.parse_expression()?;
        if let Some(operator) = self.peek_compare_op() {
            self.ts.next_token();
            let right = self.parse_expression()?;
            return Ok(Criteria::compare(left, operator, right));
        }
        if self.ts.consume_keyword("IS") {
            let negated = self.ts.consume_keyword("NOT");
            self.ts.expect_keyword("NULL")?;
            return Ok(Criteria::IsNull(IsNullCriteria {
                expression: left,
                negated,
            }));
        }
        let negated = self.ts.consume_keyword("NOT");
        if self.ts.consume_keyword("IN") {
            self.ts.expect_token(&Token::LParen)?;
            if self.ts.peek_keyword("SELECT") {
                return Err(self.ts.error("IN with a subquery is not supported"));
            }
            let values = self.parse_expression_list_until_rparen()?;
            return Ok(Criteria::Set(SetCriteria {
                expression: left,
                values,
                negated,
            }));
        }
        if self.ts.consume_keyword("BETWEEN") {
            let low = self.parse_expression()?;
            self.ts.expect_keyword("AND")?;
            let high = self.parse_expression()?;
            let range = compound(
                LogicalOp::And,
                vec![
                    Criteria::compare(left.clone(), CompareOp::Ge, low),
                    Criteria::compare(left, CompareOp::Le, high),
                ],
            );
            return Ok(if negated {
                Criteria::Not(NotCriteria {
                    criteria: Box::new(range),
                })
            } else {
                range
            });
        }
        if negated {
            return Err(self.ts.unexpected("IN or BETWEEN"));
        }
        match left {
            Expression::Constant(Constant {
                value: Scalar::Bool(b),
            }) => Ok(Criteria::Literal(b)),
            _ => Err(self.ts.unexpected("comparison operator")),
        }
    }

    fn peek_compare_op(&self) -> Option<CompareOp> {
        match self.ts.peek()? {
            Token::Eq => Some(CompareOp::Eq),
            Token::Neq => Some(CompareOp::Ne),
            Token::Lt => Some(CompareOp::Lt),
            Token::Gt => Some(CompareOp::Gt),
            Token::LtEq => Some(CompareOp::Le),
            Token::GtEq => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn peek_expression_continuation(&self) -> bool {
        self.peek_compare_op().is_some()
            || matches!(
                self.ts.peek(),
                Some(Token::Plus | Token::Minus | Token::Mul | Token::Div | Token::StringConcat)
            )
            || self.ts.peek_any_keyword(&["IS", "IN", "BETWEEN"])
    }

    // ----- expressions -----

    pub fn parse_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.ts.peek() {
                Some(Token::Plus) => "+",
                Some(Token::Minus) => "-",
                Some(Token::StringConcat) => "||",
                _ => return Ok(left),
            };
            self.ts.next_token();
            let right = self.parse_term()?;
            left = Expression::Function(Function::new(op, vec![left, right]));
        }
    }

    fn parse_term(&mut self) -> Result<Expression> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.ts.peek() {
                Some(Token::Mul) => "*",
                Some(Token::Div) => "/",
                _ => return Ok(left),
            };
            self.ts.next_token();
            let right = self.parse_factor()?;
            left = Expression::Function(Function::new(op, vec![left, right]));
        }
    }

    fn parse_factor(&mut self) -> Result<Expression> {
        if self.ts.consume_token(&Token::Minus) {
            return Ok(match self.parse_factor()? {
                Expression::Constant(Constant { value }) => Expression::constant(negate(value)),
                other => Expression::Function(Function::new(
                    "-",
                    vec![Expression::constant(Scalar::I32(0)), other],
                )),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.ts.peek().cloned() {
            Some(Token::Number(n, _)) => {
                self.ts.next_token();
                parse_number(&n)
                    .map(Expression::constant)
                    .ok_or_else(|| self.ts.error(format!("invalid number '{}'", n)))
            }
            Some(Token::SingleQuotedString(s)) => {
                self.ts.next_token();
                Ok(Expression::constant(Scalar::Str(s)))
            }
            Some(Token::Placeholder(_)) => {
                self.ts.next_token();
                let index = self.next_parameter;
                self.next_parameter += 1;
                Ok(Expression::Reference(Reference::positional(index)))
            }
            Some(Token::LParen) => {
                self.ts.next_token();
                if self.ts.peek_keyword("SELECT") {
                    let query = self.parse_query()?;
                    self.ts.expect_token(&Token::RParen)?;
                    return Ok(Expression::ScalarSubquery(ScalarSubquery {
                        query: Box::new(query),
                    }));
                }
                let inner = self.parse_expression()?;
                self.ts.expect_token(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(w)) if w.quote_style.is_none() => {
                if self.ts.consume_keyword("NULL") {
                    return Ok(Expression::constant(Scalar::Null));
                }
                if self.ts.consume_keyword("TRUE") {
                    return Ok(Expression::constant(Scalar::Bool(true)));
                }
                if self.ts.consume_keyword("FALSE") {
                    return Ok(Expression::constant(Scalar::Bool(false)));
                }
                if self.ts.consume_keyword("CASE") {
                    return self.parse_case();
                }
                self.parse_name_expression()
            }
            Some(Token::Word(_)) | Some(Token::Sharp) => self.parse_name_expression(),
            _ => Err(self.ts.unexpected("expression")),
        }
    }

    fn parse_name_expression(&mut self) -> Result<Expression> {
        let name = self.ts.parse_qualified_name()?;
        if self.ts.consume_token(&Token::LParen) {
            let args = self.parse_expression_list_until_rparen()?;
            return Ok(Expression::Function(Function::new(name, args)));
        }
        Ok(Expression::Element(ElementSymbol::new(name)))
    }

    fn parse_case(&mut self) -> Result<Expression> {
        // Simple CASE (CASE x WHEN v THEN ...) becomes a searched CASE on x = v.
        let operand = if self.ts.peek_keyword("WHEN") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let mut when = Vec::new();
        let mut then = Vec::new();
        while self.ts.consume_keyword("WHEN") {
            let criteria = match &operand {
                Some(x) => Criteria::compare(x.clone(), CompareOp::Eq, self.parse_expression()?),
                None => self.parse_criteria()?,
            };
            self.ts.expect_keyword("THEN")?;
            when.push(criteria);
            then.push(self.parse_expression()?);
        }
        if when.is_empty() {
            return Err(self.ts.unexpected("WHEN"));
        }
        let mut case = SearchedCaseExpression::new(when, then);
        if self.ts.consume_keyword("ELSE") {
            case.set_else(Some(self.parse_expression()?));
        }
        self.ts.expect_keyword("END")?;
        Ok(Expression::SearchedCase(case))
    }
}

fn compound(operator: LogicalOp, mut parts: Vec<Criteria>) -> Criteria {
    if parts.len() == 1 {
        return parts.remove(0);
    }
    Criteria::Compound(CompoundCriteria {
        operator,
        criteria: parts,
    })
}

fn parse_number(text: &str) -> Option<Scalar> {
    if text.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().ok().map(Scalar::F64);
    }
    let v = text.parse::<i64>().ok()?;
    Some(match i32::try_from(v) {
        Ok(small) => Scalar::I32(small),
        Err(_) => Scalar::I64(v),
    })
}

fn negate(value: Scalar) -> Scalar {
    match value {
        Scalar::I32(v) => Scalar::I32(-v),
        Scalar::I64(v) => Scalar::I64(-v),
        Scalar::F32(v) => Scalar::F32(-v),
        Scalar::F64(v) => Scalar::F64(-v),
        other => other,
    }
}
