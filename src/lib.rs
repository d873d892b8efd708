//! Decla: loader, formatter and linter for provider/resource declaration files.
//!
//! Files declare one provider block and any number of resource blocks.
//! Attribute values stay unevaluated expressions: `uuid()` is recorded as a
//! call, never replaced by a generated value.

pub mod cli;
pub mod core;
