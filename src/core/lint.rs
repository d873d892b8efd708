//! DC-008: Record lints.
//!
//! Checks that do not make a file unloadable but are worth reporting:
//! - region does not look like a cloud region
//! - resource type belongs to a different provider
//! - attribute calls a volatile function, so its value changes every apply

use super::functions::FunctionRegistry;
use super::policy::Policy;
use super::types::{DeclarationRecord, Expression};
use regex::Regex;
use std::fmt;

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    /// `provider.<name>` or the resource address
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.subject, self.message)
    }
}

/// Lint a record. Returns findings in file order (empty = clean).
pub fn validate_record(record: &DeclarationRecord, policy: &Policy) -> Vec<Finding> {
    let mut findings = Vec::new();
    let provider = record.provider();
    let provider_subject = format!("provider.{}", provider.name);

    if policy.check_region {
        match Regex::new(&policy.region_pattern) {
            Ok(re) if !re.is_match(&provider.region) => findings.push(Finding {
                severity: Severity::Warning,
                subject: provider_subject.clone(),
                message: format!(
                    "region '{}' does not match pattern {}",
                    provider.region, policy.region_pattern
                ),
            }),
            Ok(_) => {}
            Err(e) => findings.push(Finding {
                severity: Severity::Error,
                subject: provider_subject.clone(),
                message: format!("invalid region_pattern: {}", e),
            }),
        }
    }

    let functions = policy.functions();
    let volatile_severity = if policy.deny_volatile {
        Severity::Error
    } else {
        Severity::Warning
    };

    if policy.check_volatile {
        for (name, expr) in &provider.attributes {
            if let Some(f) = volatile_call(expr, &functions) {
                findings.push(Finding {
                    severity: volatile_severity,
                    subject: provider_subject.clone(),
                    message: volatile_message(name, &f),
                });
            }
        }
    }

    for resource in record.resources() {
        let subject = resource.address();

        if policy.check_type_prefix && resource.provider_prefix() != provider.name {
            findings.push(Finding {
                severity: Severity::Warning,
                subject: subject.clone(),
                message: format!(
                    "type '{}' does not belong to provider '{}'",
                    resource.resource_type, provider.name
                ),
            });
        }

        if policy.check_volatile {
            for (name, expr) in &resource.attributes {
                if let Some(f) = volatile_call(expr, &functions) {
                    findings.push(Finding {
                        severity: volatile_severity,
                        subject: subject.clone(),
                        message: volatile_message(name, &f),
                    });
                }
            }
        }
    }

    for f in &findings {
        tracing::debug!(severity = %f.severity, subject = %f.subject, "{}", f.message);
    }
    findings
}

/// True when any finding is an error.
pub fn has_errors(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Error)
}

/// First volatile function called anywhere inside `expr`.
fn volatile_call(expr: &Expression, functions: &FunctionRegistry) -> Option<String> {
    let mut found = None;
    expr.walk_calls(&mut |call| {
        if found.is_none() && functions.is_volatile(&call.name) {
            found = Some(call.name.clone());
        }
    });
    found
}

fn volatile_message(attribute: &str, function: &str) -> String {
    format!(
        "attribute '{}' calls {}(), its value changes on every apply unless pinned",
        attribute, function
    )
}
