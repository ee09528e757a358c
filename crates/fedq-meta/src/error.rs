use thiserror::Error;

/// Result type local to fedq-meta.
pub type Result<T> = std::result::Result<T, MetaError>;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("duplicate {kind} '{name}'")]
    DuplicateRecord { kind: &'static str, name: String },

    #[error("column '{column}' not found on '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("'{table}' already has a primary key")]
    DuplicatePrimaryKey { table: String },

    #[error("{kind} '{name}' requires a definition")]
    MissingPlan { kind: &'static str, name: String },

    #[error("unknown datatype '{0}'")]
    UnknownDatatype(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("DDL parse error: {0}")]
    Parse(#[from] fedq_lang::ParseError),

    #[error("resolution failed: {0}")]
    Resolve(String),

    #[error("invalid VDB descriptor: {0}")]
    Vdb(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MetaError {
    pub fn resolve(message: impl Into<String>) -> Self {
        MetaError::Resolve(message.into())
    }
}
