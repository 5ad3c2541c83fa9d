//! Rule contract and the context a check runs against.

use crate::domain::{LintManifest, PackageJson, RuleIssue, Severity};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;

/// A static check run against one installed package
#[async_trait]
pub trait Rule: Send + Sync {
    /// Rule name, unique within its plugin
    fn name(&self) -> &str;

    /// One-line description
    fn description(&self) -> &str;

    /// Severity used when the configuration does not set one
    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    /// Validate user options and fill in defaults.
    ///
    /// `None` means the user gave no options.
    fn validate_options(&self, options: Option<&Value>) -> Result<Value, String> {
        match options {
            None => Ok(Value::Object(Map::new())),
            Some(Value::Object(map)) => Ok(Value::Object(map.clone())),
            Some(other) => Err(format!("expected an object, got {other}")),
        }
    }

    /// Inspect the package and report issues through `ctx`
    async fn check(&self, ctx: &RuleContext, options: &Value) -> anyhow::Result<()>;
}

/// Everything a rule may look at while it runs.
///
/// Only ever lent to [`Rule::check`]; issues are collected once the check
/// returns.
#[derive(Debug)]
pub struct RuleContext {
    rule_id: String,
    severity: Severity,
    pkg_manager: String,
    manifest: LintManifest,
    issues: Mutex<Vec<RuleIssue>>,
}

impl RuleContext {
    pub(crate) fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        pkg_manager: impl Into<String>,
        manifest: LintManifest,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            pkg_manager: pkg_manager.into(),
            manifest,
            issues: Mutex::new(Vec::new()),
        }
    }

    /// Id of the running rule
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Severity issues will be reported with
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Directory of the installed package
    pub fn install_path(&self) -> &Path {
        &self.manifest.install_path
    }

    /// Installed `package.json`
    pub fn manifest(&self) -> &PackageJson {
        &self.manifest.manifest
    }

    /// `name@version` of the installed package
    pub fn package_id(&self) -> String {
        self.manifest.package_id()
    }

    /// Label of the package manager that installed the package
    pub fn pkg_manager(&self) -> &str {
        &self.pkg_manager
    }

    /// Report an issue against the package
    pub fn add_issue(&self, message: impl Into<String>, detail: Option<Value>) {
        let issue = RuleIssue {
            rule_id: self.rule_id.clone(),
            severity: self.severity,
            message: message.into(),
            detail,
            package_id: self.package_id(),
            pkg_manager: self.pkg_manager.clone(),
        };
        self.issues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(issue);
    }

    /// Consume the context, returning reported issues
    pub(crate) fn into_issues(self) -> Vec<RuleIssue> {
        self.issues
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkspaceInfo;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl Rule for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn description(&self) -> &str {
            "does nothing"
        }

        async fn check(&self, _ctx: &RuleContext, _options: &Value) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn context() -> RuleContext {
        let raw = r#"{"name":"pkg","version":"1.0.0"}"#;
        let ws = Arc::new(WorkspaceInfo::new(PathBuf::from("/repo"), raw.to_string(), true).unwrap());
        let manifest = LintManifest::new(
            PathBuf::from("/tmp/x/node_modules/pkg"),
            ws.manifest.clone(),
            ws,
        );
        RuleContext::new("noop", Severity::Warn, "npm@9.0.0", manifest)
    }

    #[test]
    fn test_default_options_validation() {
        assert_eq!(Noop.validate_options(None), Ok(json!({})));
        assert_eq!(Noop.validate_options(Some(&json!({"a": 1}))), Ok(json!({"a": 1})));
        assert!(Noop.validate_options(Some(&json!([1]))).is_err());
        assert_eq!(Noop.default_severity(), Severity::Error);
    }

    #[test]
    fn test_issues_carry_context() {
        let ctx = context();
        ctx.add_issue("found id_rsa", Some(json!({"file": "id_rsa"})));
        let issues = ctx.into_issues();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, "noop");
        assert_eq!(issues[0].severity, Severity::Warn);
        assert_eq!(issues[0].package_id, "pkg@1.0.0");
        assert_eq!(issues[0].pkg_manager, "npm@9.0.0");
    }
}
