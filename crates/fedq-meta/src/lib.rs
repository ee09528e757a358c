#![forbid(unsafe_code)]
//! fedq-meta: the metadata side of the engine.
//!
//! DDL text is parsed into a per-model [`MetadataFactory`], factories are
//! merged into one [`MetadataStore`], and the [`MetadataValidator`] pipeline
//! binds cross-schema references and resolves every stored query plan.

pub mod ddl;
pub mod error;
pub mod factory;
pub mod model;
pub mod resolver;
pub mod store;
pub mod validator;
pub mod vdb;

pub use ddl::parse_ddl;
pub use error::{MetaError, Result};
pub use factory::MetadataFactory;
pub use model::{
    Column, Datatype, ForeignKey, FunctionMethod, KeyRecord, KeyType, Procedure, Schema, Table,
    TableKind,
};
pub use resolver::{QueryResolver, ResolveContext, ScopeGroup};
pub use store::MetadataStore;
pub use validator::{MetadataRule, MetadataValidator, ValidatorFailure, ValidatorReport};
pub use vdb::{load_store, ModelMetaData, ModelType, VdbMetaData};
