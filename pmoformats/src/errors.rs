use std::num::ParseIntError;

use thiserror::Error;

/// Diagnostic attached to a `Supported` rule that was dropped at compile time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("No container (f:) declared in rule \"{0}\"")]
    MissingContainer(String),
    #[error("Invalid {field} pattern \"{pattern}\" in rule \"{rule}\": {reason}")]
    InvalidPattern {
        rule: String,
        field: String,
        pattern: String,
        reason: String,
    },
    #[error("Invalid {field} value \"{value}\" in rule \"{rule}\": {reason}")]
    InvalidNumber {
        rule: String,
        field: String,
        value: String,
        reason: String,
    },
}

impl RuleError {
    pub fn invalid_pattern(rule: &str, field: &str, pattern: &str, err: &regex::Error) -> Self {
        RuleError::InvalidPattern {
            rule: rule.to_string(),
            field: field.to_string(),
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn invalid_number(rule: &str, field: &str, value: &str, err: &ParseIntError) -> Self {
        RuleError::InvalidNumber {
            rule: rule.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            reason: err.to_string(),
        }
    }

    /// The raw rule line this diagnostic refers to.
    pub fn rule(&self) -> &str {
        match self {
            RuleError::MissingContainer(rule) => rule,
            RuleError::InvalidPattern { rule, .. } => rule,
            RuleError::InvalidNumber { rule, .. } => rule,
        }
    }
}
