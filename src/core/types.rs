//! DC-001: Declaration record types.
//!
//! A declaration file holds one provider block and an ordered list of
//! resource blocks. Attribute values are kept as unevaluated expressions;
//! `uuid()` stays a call node and is never turned into a value here.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Declaration record
// ============================================================================

/// A parsed declaration file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationRecord {
    pub(crate) provider: ProviderConfig,
    pub(crate) resources: Vec<ResourceDeclaration>,
}

impl DeclarationRecord {
    /// Provider configuration.
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Resource declarations in file order.
    ///
    /// The iterator is cheap to clone, so a caller can walk it more than once.
    pub fn resources(&self) -> std::slice::Iter<'_, ResourceDeclaration> {
        self.resources.iter()
    }

    /// Look up a resource by logical name.
    pub fn resource(&self, logical_name: &str) -> Option<&ResourceDeclaration> {
        self.resources
            .iter()
            .find(|r| r.logical_name == logical_name)
    }

    /// Number of resource declarations.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when the file declares no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl std::str::FromStr for DeclarationRecord {
    type Err = LoadError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        super::parser::load(source)
    }
}

// ============================================================================
// Provider
// ============================================================================

/// The `provider "<name>" { ... }` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider label, e.g. `aws`
    pub name: String,

    /// Target region, e.g. `us-west-2`
    pub region: String,

    /// Remaining provider attributes (file order)
    #[serde(default)]
    pub attributes: IndexMap<String, Expression>,
}

// ============================================================================
// Resources
// ============================================================================

/// A `resource "<type>" "<name>" { ... }` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Full type label, e.g. `aws_datapipeline_pipeline`
    #[serde(rename = "type")]
    pub resource_type: String,

    /// User-chosen name, unique within the file
    pub logical_name: String,

    /// Attribute expressions (file order)
    #[serde(default)]
    pub attributes: IndexMap<String, Expression>,
}

impl ResourceDeclaration {
    /// Provider part of the type label (`aws` for `aws_s3_bucket`).
    pub fn provider_prefix(&self) -> &str {
        self.resource_type
            .split_once('_')
            .map_or(self.resource_type.as_str(), |(prefix, _)| prefix)
    }

    /// Type label without the provider prefix (`s3_bucket` for `aws_s3_bucket`).
    pub fn kind(&self) -> &str {
        self.resource_type
            .split_once('_')
            .map_or(self.resource_type.as_str(), |(_, kind)| kind)
    }

    /// `type.name` address of this resource.
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.logical_name)
    }

    /// Attribute expression by name.
    pub fn attribute(&self, name: &str) -> Option<&Expression> {
        self.attributes.get(name)
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// An unevaluated attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Literal),
    Call(FunctionCall),
    Reference(Reference),
    List(Vec<Expression>),
    Object(IndexMap<String, Expression>),
}

impl Expression {
    /// Zero-argument call node, e.g. `uuid()`.
    pub fn call0(name: &str) -> Self {
        Self::Call(FunctionCall {
            name: name.to_string(),
            args: Vec::new(),
        })
    }

    /// String literal node.
    pub fn string(value: &str) -> Self {
        Self::Literal(Literal::String(value.to_string()))
    }

    /// The call node, if this is a function call.
    pub fn as_call(&self) -> Option<&FunctionCall> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }

    /// The string value, if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Literal::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Visit every function call in this expression, outermost first.
    pub fn walk_calls<'a>(&'a self, visit: &mut dyn FnMut(&'a FunctionCall)) {
        match self {
            Self::Call(call) => {
                visit(call);
                for arg in &call.args {
                    arg.walk_calls(visit);
                }
            }
            Self::List(items) => {
                for item in items {
                    item.walk_calls(visit);
                }
            }
            Self::Object(entries) => {
                for value in entries.values() {
                    value.walk_calls(visit);
                }
            }
            Self::Literal(_) | Self::Reference(_) => {}
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// A function call such as `uuid()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expression>,
}

/// A dotted traversal such as `var.region`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub path: Vec<String>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join("."))
    }
}

// ============================================================================
// Load errors
// ============================================================================

/// What kind of name collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Provider,
    Resource,
    Attribute,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider => write!(f, "provider"),
            Self::Resource => write!(f, "resource"),
            Self::Attribute => write!(f, "attribute"),
        }
    }
}

/// Everything `load` can reject. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("duplicate {kind} '{name}' at line {line} (first declared at line {first_line})")]
    DuplicateName {
        kind: NameKind,
        name: String,
        line: usize,
        first_line: usize,
    },

    #[error("unknown function '{name}' at {line}:{column}")]
    UnknownFunction {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("function '{name}' takes {expected} argument(s), got {found} at {line}:{column}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
        line: usize,
        column: usize,
    },

    #[error("failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
}

impl LoadError {
    /// Line the error points at, when it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. }
            | Self::DuplicateName { line, .. }
            | Self::UnknownFunction { line, .. }
            | Self::Arity { line, .. } => Some(*line),
            Self::Io { .. } => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
