use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("tokenizer error: {0}")]
    Tokenize(String),

    #[error("parse error at token {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unexpected end of input: {0}")]
    UnexpectedEnd(String),
}

impl ParseError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            position,
            message: message.into(),
        }
    }
}
