//! DC-007: Lint policy file.
//!
//! A small YAML document controlling which lints run and which extra
//! functions the loader accepts:
//!
//! ```yaml
//! region_pattern: "^[a-z]{2}(-[a-z]+)+-[0-9]+$"
//! deny_volatile: true
//! extra_functions:
//!   - name: md5
//!     args: 1
//! ```

use super::functions::{FunctionRegistry, FunctionSignature};
use super::parser::LoadOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lint and loader policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Regex a provider region must match
    #[serde(default = "default_region_pattern")]
    pub region_pattern: String,

    /// Check the region against `region_pattern`
    #[serde(default = "default_true")]
    pub check_region: bool,

    /// Check resource type prefixes against the provider name
    #[serde(default = "default_true")]
    pub check_type_prefix: bool,

    /// Report attributes that call volatile functions
    #[serde(default = "default_true")]
    pub check_volatile: bool,

    /// Report volatile calls as errors instead of warnings
    #[serde(default)]
    pub deny_volatile: bool,

    /// Functions accepted in addition to the built-ins
    #[serde(default)]
    pub extra_functions: Vec<FunctionSignature>,
}

fn default_region_pattern() -> String {
    r"^[a-z]{2}(-[a-z]+)+-[0-9]+$".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            region_pattern: default_region_pattern(),
            check_region: true,
            check_type_prefix: true,
            check_volatile: true,
            deny_volatile: false,
            extra_functions: Vec::new(),
        }
    }
}

impl Policy {
    /// Built-in functions plus `extra_functions`.
    pub fn functions(&self) -> FunctionRegistry {
        let mut registry = FunctionRegistry::builtin();
        for sig in &self.extra_functions {
            registry.register(sig.clone());
        }
        registry
    }

    /// Loader options honouring this policy.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            functions: self.functions(),
        }
    }
}

/// Parse a policy from YAML. The region pattern must compile.
pub fn parse_policy(yaml: &str) -> Result<Policy, String> {
    let policy: Policy =
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("policy parse error: {}", e))?;
    regex::Regex::new(&policy.region_pattern)
        .map_err(|e| format!("invalid region_pattern: {}", e))?;
    Ok(policy)
}

/// Read and parse a policy file.
pub fn parse_policy_file(path: &Path) -> Result<Policy, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_policy(&content)
}
