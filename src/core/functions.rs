//! DC-004: Function registry.
//!
//! The loader only records calls; it never evaluates them. What it does check
//! is that the called function exists and that the argument count fits.
//! Functions whose result changes on every apply are flagged volatile.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Accepted argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{}", n),
            Self::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// A callable function's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSignature {
    pub name: String,

    /// Required argument count
    #[serde(default)]
    pub args: usize,

    /// Accepts any number of further arguments
    #[serde(default)]
    pub variadic: bool,

    /// Result differs between applies (`uuid`, `timestamp`)
    #[serde(default)]
    pub volatile: bool,
}

impl FunctionSignature {
    pub fn new(name: &str, arity: Arity, volatile: bool) -> Self {
        let (args, variadic) = match arity {
            Arity::Exact(n) => (n, false),
            Arity::AtLeast(n) => (n, true),
        };
        Self {
            name: name.to_string(),
            args,
            variadic,
            volatile,
        }
    }

    pub fn arity(&self) -> Arity {
        if self.variadic {
            Arity::AtLeast(self.args)
        } else {
            Arity::Exact(self.args)
        }
    }
}

/// Why a call was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    Unknown,
    Arity(Arity),
}

/// Known functions, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRegistry {
    functions: IndexMap<String, FunctionSignature>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FunctionRegistry {
    /// Registry with no functions at all.
    pub fn empty() -> Self {
        Self {
            functions: IndexMap::new(),
        }
    }

    /// The built-in function table.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for sig in [
            FunctionSignature::new("uuid", Arity::Exact(0), true),
            FunctionSignature::new("timestamp", Arity::Exact(0), true),
            FunctionSignature::new("lower", Arity::Exact(1), false),
            FunctionSignature::new("upper", Arity::Exact(1), false),
            FunctionSignature::new("join", Arity::Exact(2), false),
            FunctionSignature::new("format", Arity::AtLeast(1), false),
        ] {
            registry.register(sig);
        }
        registry
    }

    /// Add or replace a signature.
    pub fn register(&mut self, sig: FunctionSignature) {
        self.functions.insert(sig.name.clone(), sig);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Check a call of `name` with `argc` arguments.
    pub fn check_call(&self, name: &str, argc: usize) -> Result<&FunctionSignature, CallError> {
        let sig = self.functions.get(name).ok_or(CallError::Unknown)?;
        let arity = sig.arity();
        if arity.accepts(argc) {
            Ok(sig)
        } else {
            Err(CallError::Arity(arity))
        }
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        self.functions.get(name).is_some_and(|sig| sig.volatile)
    }
}
