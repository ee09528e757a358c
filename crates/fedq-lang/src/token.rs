//! Token stream over the `sqlparser` tokenizer.
//!
//! Whitespace is kept aside so the raw text of any token range can be
//! recovered (DDL keeps view and procedure bodies as text), while parsing only
//! ever looks at significant tokens. Keywords are matched case-insensitively
//! against unquoted words.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::{ParseError, Result};

pub struct TokenStream {
    tokens: Vec<Token>,
    significant: Vec<usize>,
    pos: usize,
}

impl TokenStream {
    pub fn tokenize(sql: &str) -> Result<Self> {
        let dialect = GenericDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| ParseError::Tokenize(e.to_string()))?;
        let significant = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .map(|(i, _)| i)
            .collect();
        Ok(Self {
            tokens,
            significant,
            pos: 0,
        })
    }

    /// Current position, in significant tokens.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.significant.len()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.peek_nth(0)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.significant
            .get(self.pos + n)
            .map(|&i| &self.tokens[i])
    }

    pub fn next_token(&mut self) -> Option<Token> {
        let t = self.peek().cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    pub fn peek_nth_keyword(&self, n: usize, keyword: &str) -> bool {
        match self.peek_nth(n) {
            Some(Token::Word(w)) => w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword),
            _ => false,
        }
    }

    pub fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek_nth_keyword(0, keyword)
    }

    pub fn peek_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.peek_keyword(k))
    }

    pub fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a whole keyword sequence, or nothing.
    pub fn consume_keywords(&mut self, keywords: &[&str]) -> bool {
        let all = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.peek_nth_keyword(i, k));
        if all {
            self.pos += keywords.len();
        }
        all
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    pub fn peek_token(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    pub fn consume_token(&mut self, token: &Token) -> bool {
        if self.peek_token(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_token(&mut self, token: &Token) -> Result<()> {
        if self.consume_token(token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    /// A single (possibly quoted) identifier. `#name` is accepted for temp groups.
    pub fn parse_identifier(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Word(w)) => {
                self.pos += 1;
                Ok(w.value)
            }
            Some(Token::Sharp) => {
                self.pos += 1;
                match self.next_token() {
                    Some(Token::Word(w)) => Ok(format!("#{}", w.value)),
                    _ => Err(self.error("expected identifier after '#'")),
                }
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// `ident(.ident)*`, stopping before `.*`.
    pub fn parse_qualified_name(&mut self) -> Result<String> {
        let mut name = self.parse_identifier()?;
        while self.peek_token(&Token::Period)
            && matches!(self.peek_nth(1), Some(Token::Word(_)))
        {
            self.pos += 1;
            name.push('.');
            name.push_str(&self.parse_identifier()?);
        }
        Ok(name)
    }

    /// Raw source text of significant tokens `[from, to)`, whitespace included.
    pub fn text_range(&self, from: usize, to: usize) -> String {
        if from >= to || from >= self.significant.len() {
            return String::new();
        }
        let start = self.significant[from];
        let end = self.significant[(to - 1).min(self.significant.len() - 1)];
        self.tokens[start..=end]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        if self.is_eof() {
            ParseError::UnexpectedEnd(message.into())
        } else {
            ParseError::syntax(self.pos, message)
        }
    }

    pub fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(found) => ParseError::syntax(
                self.pos,
                format!("expected {} but found '{}'", expected, found),
            ),
            None => ParseError::UnexpectedEnd(format!("expected {}", expected)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_ignore_case_and_whitespace() {
        let mut ts = TokenStream::tokenize("create   FOREIGN table g1").unwrap();
        assert!(ts.consume_keywords(&["CREATE", "foreign", "TABLE"]));
        assert_eq!(ts.parse_identifier().unwrap(), "g1");
        assert!(ts.is_eof());
    }

    #[test]
    fn qualified_names_stop_before_star() {
        let mut ts = TokenStream::tokenize("pm1.g1.* x").unwrap();
        assert_eq!(ts.parse_qualified_name().unwrap(), "pm1.g1");
        assert!(ts.consume_token(&Token::Period));
        assert!(ts.consume_token(&Token::Mul));
    }

    #[test]
    fn text_range_keeps_spacing() {
        let ts = TokenStream::tokenize("AS select e1,  e2 from foo.bar;").unwrap();
        // tokens: AS select e1 , e2 from foo . bar ;
        assert_eq!(ts.text_range(1, 9), "select e1,  e2 from foo.bar");
    }
}
