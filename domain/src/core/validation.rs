//! Configuration issue reporting.
//!
//! Config sections validate themselves into a list of [`ConfigIssue`]s rather
//! than failing outright, so a relay with a slightly wrong file still starts
//! and the operator sees every problem at once.

use std::fmt;

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: a default is used instead.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// A string field holds a value outside its allowed set.
    InvalidEnumValue {
        field: String,
        value: String,
        valid_values: Vec<String>,
    },
    /// A numeric or structural constraint is violated.
    InvalidConstraint { field: String },
    /// A required value is missing.
    MissingValue { field: String },
}

/// A detected issue in the configuration.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_severity() {
        let w = ConfigIssue::warning(
            ConfigIssueCode::InvalidConstraint {
                field: "scheduler".to_string(),
            },
            "bad",
        );
        assert!(!w.is_error());

        let e = ConfigIssue::error(
            ConfigIssueCode::MissingValue {
                field: "admin.internal_api_token".to_string(),
            },
            "missing",
        );
        assert!(e.is_error());
        assert_eq!(e.severity.to_string(), "error");
    }
}
