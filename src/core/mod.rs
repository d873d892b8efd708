//! Core declaration logic: types, grammar, loading, rendering and lints.

pub mod functions;
pub mod grammar;
pub mod hasher;
pub mod lint;
pub mod parser;
pub mod policy;
pub mod render;
pub mod types;

pub use parser::{load, load_file, load_with, LoadOptions};
pub use types::{
    DeclarationRecord, Expression, FunctionCall, Literal, LoadError, NameKind, ProviderConfig,
    Reference, ResourceDeclaration,
};
