//! Rule severities, issues and per-rule configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// How seriously a rule's issues are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warn,
    Off,
}

impl Severity {
    /// A rule with severity `off` is never run
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Off => "off",
        };
        f.write_str(s)
    }
}

/// One rule violation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleIssue {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    /// `name@version` of the offending package
    pub package_id: String,
    pub pkg_manager: String,
}

impl RuleIssue {
    /// Is this an error-severity issue?
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A rule setting as written by the user.
///
/// Accepted forms: `"warn"`, `true`/`false`, `{ ...options }` and
/// `["error", { ...options }]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRuleSetting {
    Enabled(bool),
    Severity(Severity),
    WithOptions(Severity, Value),
    Options(Map<String, Value>),
}

impl RawRuleSetting {
    /// Split into an explicit severity (if any) and raw options (if any)
    pub fn into_parts(self) -> (Option<Severity>, Option<Value>) {
        match self {
            Self::Enabled(true) => (None, None),
            Self::Enabled(false) => (Some(Severity::Off), None),
            Self::Severity(severity) => (Some(severity), None),
            Self::WithOptions(severity, options) => (Some(severity), Some(options)),
            Self::Options(options) => (None, Some(Value::Object(options))),
        }
    }
}

/// Resolved severity and validated options for one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleConfig {
    pub severity: Severity,
    pub options: Value,
}

impl RuleConfig {
    /// Create a resolved config
    pub fn new(severity: Severity, options: Value) -> Self {
        Self { severity, options }
    }

    /// Should the rule run?
    pub fn is_enabled(&self) -> bool {
        self.severity.is_enabled()
    }
}
