//! Per-phase results and the aggregate outcome of a run.

use super::{ExecOutput, InstallManifest, PkgManagerSpec, RuleIssue, Severity};
use crate::error::{PkgManagerError, ReporterError, RuleError, UnsupportedPackageManagerError};
use serde::Serialize;
use std::path::PathBuf;

/// Issues one rule reported against one package
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub rule_id: String,
    pub package_id: String,
    pub issues: Vec<RuleIssue>,
}

/// Outcome of one script in one package
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ScriptOutcome {
    Passed { output: ExecOutput },
    Failed { output: ExecOutput },
    Skipped,
    Error { error: PkgManagerError },
}

impl ScriptOutcome {
    /// Does this outcome count against the run?
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Error { .. })
    }
}

/// Result of running one script
#[derive(Debug, Clone, Serialize)]
pub struct ScriptResult {
    pub package_id: String,
    pub script: String,
    #[serde(flatten)]
    pub outcome: ScriptOutcome,
}

/// Everything one package manager actor produced
#[derive(Debug, Clone, Serialize)]
pub struct PkgManagerOutcome {
    pub spec: PkgManagerSpec,
    pub label: String,
    pub packed: Vec<InstallManifest>,
    pub installed: Vec<String>,
    pub pack_errors: Vec<PkgManagerError>,
    pub install_errors: Vec<PkgManagerError>,
    pub lint: Vec<LintResult>,
    pub rule_errors: Vec<RuleError>,
    pub scripts: Vec<ScriptResult>,
    /// Lifecycle failure that stopped the actor early
    pub fatal: Option<PkgManagerError>,
    /// Temporary directory kept under `linger`
    pub lingered: Option<PathBuf>,
    pub aborted: bool,
    /// Best-effort cleanup failures; these never fail the run
    pub cleanup_warnings: Vec<String>,
}

impl PkgManagerOutcome {
    /// Empty outcome for a spec
    pub fn new(spec: PkgManagerSpec) -> Self {
        Self {
            label: spec.label(),
            spec,
            packed: Vec::new(),
            installed: Vec::new(),
            pack_errors: Vec::new(),
            install_errors: Vec::new(),
            lint: Vec::new(),
            rule_errors: Vec::new(),
            scripts: Vec::new(),
            fatal: None,
            lingered: None,
            aborted: false,
            cleanup_warnings: Vec::new(),
        }
    }

    /// All issues across lint results
    pub fn issues(&self) -> impl Iterator<Item = &RuleIssue> {
        self.lint.iter().flat_map(|r| r.issues.iter())
    }

    /// Number of issues with the given severity
    pub fn count_issues(&self, severity: Severity) -> usize {
        self.issues().filter(|i| i.severity == severity).count()
    }

    /// Did this package manager pass? Warnings never affect the result.
    pub fn is_success(&self) -> bool {
        !self.aborted
            && self.fatal.is_none()
            && self.pack_errors.is_empty()
            && self.install_errors.is_empty()
            && self.rule_errors.is_empty()
            && !self.issues().any(RuleIssue::is_error)
            && !self.scripts.iter().any(|s| s.outcome.is_failure())
    }
}

/// Aggregate outcome of a smoke run
#[derive(Debug, Clone, Serialize)]
pub struct SmokeResults {
    pub pkg_managers: Vec<PkgManagerOutcome>,
    pub unsupported: Vec<UnsupportedPackageManagerError>,
    pub reporter_errors: Vec<ReporterError>,
    pub success: bool,
    pub aborted: bool,
}

impl SmokeResults {
    /// Aggregate package manager outcomes into a final result
    pub fn aggregate(
        pkg_managers: Vec<PkgManagerOutcome>,
        unsupported: Vec<UnsupportedPackageManagerError>,
        aborted: bool,
    ) -> Self {
        let success = !aborted && pkg_managers.iter().all(PkgManagerOutcome::is_success);
        Self {
            pkg_managers,
            unsupported,
            reporter_errors: Vec::new(),
            success,
            aborted,
        }
    }

    /// All issues across package managers
    pub fn issues(&self) -> impl Iterator<Item = &RuleIssue> {
        self.pkg_managers.iter().flat_map(|pm| pm.issues())
    }

    /// Number of issues with the given severity
    pub fn count_issues(&self, severity: Severity) -> usize {
        self.pkg_managers
            .iter()
            .map(|pm| pm.count_issues(severity))
            .sum()
    }

    /// All script results across package managers
    pub fn scripts(&self) -> impl Iterator<Item = &ScriptResult> {
        self.pkg_managers.iter().flat_map(|pm| pm.scripts.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use std::time::Duration;

    fn outcome() -> PkgManagerOutcome {
        PkgManagerOutcome::new(PkgManagerSpec::new("npm", Version::new(9, 0, 0), false))
    }

    fn issue(severity: Severity) -> RuleIssue {
        RuleIssue {
            rule_id: "no-banned-files".to_string(),
            severity,
            message: "banned".to_string(),
            detail: None,
            package_id: "pkg@1.0.0".to_string(),
            pkg_manager: "npm@9.0.0".to_string(),
        }
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let mut pm = outcome();
        pm.lint.push(LintResult {
            rule_id: "no-banned-files".to_string(),
            package_id: "pkg@1.0.0".to_string(),
            issues: vec![issue(Severity::Warn)],
        });
        assert!(pm.is_success());
        assert_eq!(pm.count_issues(Severity::Warn), 1);

        pm.lint[0].issues.push(issue(Severity::Error));
        assert!(!pm.is_success());
    }

    #[test]
    fn test_failed_script_fails_run() {
        let mut pm = outcome();
        pm.scripts.push(ScriptResult {
            package_id: "pkg@1.0.0".to_string(),
            script: "smoke".to_string(),
            outcome: ScriptOutcome::Failed {
                output: ExecOutput::new("npm run smoke", 1, "", "", Duration::ZERO),
            },
        });
        let results = SmokeResults::aggregate(vec![pm], Vec::new(), false);
        assert!(!results.success);
        assert_eq!(results.scripts().count(), 1);
    }

    #[test]
    fn test_skipped_script_and_unsupported_do_not_fail() {
        let mut pm = outcome();
        pm.scripts.push(ScriptResult {
            package_id: "pkg@1.0.0".to_string(),
            script: "smoke".to_string(),
            outcome: ScriptOutcome::Skipped,
        });
        let unsupported = vec![UnsupportedPackageManagerError {
            requested: "pnpm".to_string(),
            workspace: Some("other".to_string()),
        }];
        let results = SmokeResults::aggregate(vec![pm], unsupported, false);
        assert!(results.success);
    }

    #[test]
    fn test_aborted_is_not_success() {
        let results = SmokeResults::aggregate(vec![outcome()], Vec::new(), true);
        assert!(!results.success);
        assert!(results.aborted);
    }
}
