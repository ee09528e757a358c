#![forbid(unsafe_code)]
//! fedq-lang: the language object tree.
//!
//! Commands, clauses, criteria and expressions are plain owned trees. Every
//! node kind implements [`LanguageObject`], which gives double dispatch into a
//! [`LanguageVisitor`] and a structural walk used by the navigators. Analyses
//! (group collection, element collection, ...) are written as visitors and
//! never touch the node types.

pub mod collect;
pub mod command;
pub mod error;
pub mod expr;
pub mod mutate;
pub mod navigator;
pub mod parser;
pub mod sql;
pub mod symbol;
pub mod token;
pub mod visitor;

pub use collect::{ElementCollectorVisitor, GroupCollectorVisitor, ReferenceCollectorVisitor};
pub use command::*;
pub use error::{ParseError, Result};
pub use expr::*;
pub use mutate::{for_each_criteria_expression_mut, for_each_expression_mut, replace_elements};
pub use navigator::{DeepPreOrderNavigator, Navigator, PreOrderNavigator};
pub use parser::{Parser, QueryParser};
pub use symbol::{ElementSymbol, GroupBinding, GroupKind, GroupSymbol};
pub use token::TokenStream;
pub use visitor::{LanguageObject, LanguageVisitor};
