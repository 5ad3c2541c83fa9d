//! Builtin reporters.

use crate::config::SmokerConfig;
use crate::domain::{ExecOutput, RuleIssue, ScriptOutcome, Severity, SmokeResults};
use crate::error::{PkgManagerError, RuleError};
use crate::plugin::{Reporter, ReporterContext};
use async_trait::async_trait;
use serde_json::json;
use std::fmt::Write as _;
use std::path::PathBuf;

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

fn issue_line(issue: &RuleIssue) -> String {
    format!(
        "  [{}] {} ({}): {}",
        issue.severity, issue.rule_id, issue.package_id, issue.message
    )
}

/// Raw subprocess output, shown under `verbose`
fn print_raw(output: &ExecOutput) {
    for stream in [&output.stdout, &output.stderr] {
        let text = stream.trim_end();
        if !text.is_empty() {
            println!("{text}");
        }
    }
}

/// Final summary printed by the console reporter
pub(crate) fn render_summary(results: &SmokeResults) -> String {
    let mut out = String::new();

    for pm in &results.pkg_managers {
        let failed = pm.pack_errors.len() + pm.install_errors.len();
        let _ = writeln!(
            out,
            "{}: {} installed, {} failed",
            pm.label,
            pm.installed.len(),
            failed
        );
        if let Some(fatal) = &pm.fatal {
            let _ = writeln!(out, "  {fatal}");
        }
        for warning in &pm.cleanup_warnings {
            let _ = writeln!(out, "  warning: {warning}");
        }
    }
    for unsupported in &results.unsupported {
        let _ = writeln!(out, "Skipped: {unsupported}");
    }

    let _ = write!(
        out,
        "Lint: {}, {}",
        plural(results.count_issues(Severity::Error), "error"),
        plural(results.count_issues(Severity::Warn), "warning")
    );
    let rule_errors: usize = results.pkg_managers.iter().map(|pm| pm.rule_errors.len()).sum();
    if rule_errors > 0 {
        let _ = write!(out, ", {}", plural(rule_errors, "rule error"));
    }
    out.push('\n');

    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for script in results.scripts() {
        match script.outcome {
            ScriptOutcome::Passed { .. } => passed += 1,
            ScriptOutcome::Skipped => skipped += 1,
            ScriptOutcome::Failed { .. } | ScriptOutcome::Error { .. } => failed += 1,
        }
    }
    let _ = writeln!(
        out,
        "Scripts: {passed} passed, {failed} failed, {skipped} skipped"
    );

    let verdict = if results.aborted {
        "aborted"
    } else if results.success {
        "passed"
    } else {
        "failed"
    };
    let _ = write!(out, "Smoke test {verdict}");
    out
}

/// Human-readable progress and summary on the terminal
#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter;

#[async_trait]
impl Reporter for ConsoleReporter {
    fn name(&self) -> &str {
        "console"
    }

    fn description(&self) -> &str {
        "Prints progress and a summary"
    }

    fn enabled(&self, config: &SmokerConfig) -> bool {
        !config.json
    }

    async fn on_smoke_begin(
        &self,
        _ctx: &ReporterContext,
        pkg_managers: &[String],
        workspaces: &[String],
        rules: &[String],
        scripts: &[String],
    ) -> anyhow::Result<()> {
        tracing::debug!("Console reporter: rules {:?}, scripts {:?}", rules, scripts);
        println!(
            "Smoking {} with {}",
            plural(workspaces.len(), "package"),
            pkg_managers.join(", ")
        );
        Ok(())
    }

    async fn on_install_ok(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
        output: &ExecOutput,
    ) -> anyhow::Result<()> {
        if ctx.config.verbose {
            println!("Installed {package} with {pkg_manager}");
            print_raw(output);
        }
        Ok(())
    }

    async fn on_script_ok(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
        script: &str,
        output: &ExecOutput,
    ) -> anyhow::Result<()> {
        if ctx.config.verbose {
            println!("Script {script} passed in {package} ({pkg_manager})");
            print_raw(output);
        }
        Ok(())
    }

    async fn on_pack_failed(
        &self,
        _ctx: &ReporterContext,
        error: &PkgManagerError,
    ) -> anyhow::Result<()> {
        eprintln!("{error}");
        Ok(())
    }

    async fn on_install_failed(
        &self,
        _ctx: &ReporterContext,
        error: &PkgManagerError,
    ) -> anyhow::Result<()> {
        eprintln!("{error}");
        Ok(())
    }

    async fn on_rule_failed(
        &self,
        _ctx: &ReporterContext,
        _pkg_manager: &str,
        _rule: &str,
        _package: &str,
        issues: &[RuleIssue],
    ) -> anyhow::Result<()> {
        for issue in issues {
            println!("{}", issue_line(issue));
        }
        Ok(())
    }

    async fn on_rule_error(&self, _ctx: &ReporterContext, error: &RuleError) -> anyhow::Result<()> {
        eprintln!("{error}");
        Ok(())
    }

    async fn on_script_failed(
        &self,
        _ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
        script: &str,
        output: &ExecOutput,
    ) -> anyhow::Result<()> {
        println!(
            "Script {script} failed in {package} ({pkg_manager}), exit code {}",
            output.exit_code
        );
        let diagnostic = output.diagnostic();
        if !diagnostic.is_empty() {
            println!("{diagnostic}");
        }
        Ok(())
    }

    async fn on_script_error(
        &self,
        _ctx: &ReporterContext,
        error: &PkgManagerError,
    ) -> anyhow::Result<()> {
        eprintln!("{error}");
        Ok(())
    }

    async fn on_lingered(
        &self,
        _ctx: &ReporterContext,
        directories: &[PathBuf],
    ) -> anyhow::Result<()> {
        for dir in directories {
            println!("Lingering: {}", dir.display());
        }
        Ok(())
    }

    async fn on_smoke_ok(&self, _ctx: &ReporterContext, results: &SmokeResults) -> anyhow::Result<()> {
        println!("{}", render_summary(results));
        Ok(())
    }

    async fn on_smoke_failed(
        &self,
        _ctx: &ReporterContext,
        results: &SmokeResults,
    ) -> anyhow::Result<()> {
        println!("{}", render_summary(results));
        Ok(())
    }

    async fn on_smoke_aborted(
        &self,
        _ctx: &ReporterContext,
        results: &SmokeResults,
    ) -> anyhow::Result<()> {
        println!("{}", render_summary(results));
        Ok(())
    }

    async fn on_smoke_error(&self, _ctx: &ReporterContext, error: &str) -> anyhow::Result<()> {
        eprintln!("smoker failed: {error}");
        Ok(())
    }
}

/// Machine-readable results on stdout
#[derive(Debug, Clone, Default)]
pub struct JsonReporter;

impl JsonReporter {
    fn print(results: &SmokeResults) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(results)?);
        Ok(())
    }
}

#[async_trait]
impl Reporter for JsonReporter {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Prints results as JSON"
    }

    fn enabled(&self, config: &SmokerConfig) -> bool {
        config.json
    }

    async fn on_smoke_ok(&self, _ctx: &ReporterContext, results: &SmokeResults) -> anyhow::Result<()> {
        Self::print(results)
    }

    async fn on_smoke_failed(
        &self,
        _ctx: &ReporterContext,
        results: &SmokeResults,
    ) -> anyhow::Result<()> {
        Self::print(results)
    }

    async fn on_smoke_aborted(
        &self,
        _ctx: &ReporterContext,
        results: &SmokeResults,
    ) -> anyhow::Result<()> {
        Self::print(results)
    }

    async fn on_smoke_error(&self, _ctx: &ReporterContext, error: &str) -> anyhow::Result<()> {
        println!("{}", json!({ "success": false, "error": error }));
        Ok(())
    }
}
