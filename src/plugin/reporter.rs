//! Reporter contract.
//!
//! A reporter overrides the hooks it cares about; [`Reporter::on_event`]
//! routes each event to its hook.

use crate::config::SmokerConfig;
use crate::domain::{ExecOutput, InstallManifest, RuleIssue, SmokeResults, SmokerEvent};
use crate::error::{PkgManagerError, RuleError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// What a reporter receives besides events
#[derive(Debug, Clone)]
pub struct ReporterContext {
    /// Id of the reporter component
    pub id: String,
    pub config: Arc<SmokerConfig>,
}

/// Renders the event stream
#[async_trait]
#[allow(unused_variables)]
pub trait Reporter: Send + Sync {
    /// Reporter name, unique within its plugin
    fn name(&self) -> &str;

    /// One-line description
    fn description(&self) -> &str;

    /// Should this reporter run for the given options?
    fn enabled(&self, config: &SmokerConfig) -> bool {
        true
    }

    async fn setup(&self, ctx: &ReporterContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn teardown(&self, ctx: &ReporterContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_smoke_begin(
        &self,
        ctx: &ReporterContext,
        pkg_managers: &[String],
        workspaces: &[String],
        rules: &[String],
        scripts: &[String],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_pack_begin(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        workspace: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_pack_ok(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        manifest: &InstallManifest,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_pack_failed(
        &self,
        ctx: &ReporterContext,
        error: &PkgManagerError,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_install_begin(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_install_ok(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
        output: &ExecOutput,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_install_failed(
        &self,
        ctx: &ReporterContext,
        error: &PkgManagerError,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_rule_begin(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        rule: &str,
        package: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_rule_ok(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        rule: &str,
        package: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_rule_failed(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        rule: &str,
        package: &str,
        issues: &[RuleIssue],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_rule_error(&self, ctx: &ReporterContext, error: &RuleError) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_script_begin(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
        script: &str,
    ) -> anyhow::Result<()> {
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
        Ok(())
    }

    async fn on_script_failed(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
        script: &str,
        output: &ExecOutput,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_script_error(
        &self,
        ctx: &ReporterContext,
        error: &PkgManagerError,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_script_skipped(
        &self,
        ctx: &ReporterContext,
        pkg_manager: &str,
        package: &str,
        script: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_lingered(
        &self,
        ctx: &ReporterContext,
        directories: &[PathBuf],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_smoke_ok(&self, ctx: &ReporterContext, results: &SmokeResults) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_smoke_failed(
        &self,
        ctx: &ReporterContext,
        results: &SmokeResults,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_smoke_error(&self, ctx: &ReporterContext, error: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_smoke_aborted(
        &self,
        ctx: &ReporterContext,
        results: &SmokeResults,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Route an event to its hook
    async fn on_event(&self, ctx: &ReporterContext, event: &SmokerEvent) -> anyhow::Result<()> {
        match event {
            SmokerEvent::SmokeBegin {
                pkg_managers,
                workspaces,
                rules,
                scripts,
            } => {
                self.on_smoke_begin(ctx, pkg_managers, workspaces, rules, scripts)
                    .await
            }
            SmokerEvent::PackBegin {
                pkg_manager,
                workspace,
            } => self.on_pack_begin(ctx, pkg_manager, workspace).await,
            SmokerEvent::PackOk {
                pkg_manager,
                manifest,
            } => self.on_pack_ok(ctx, pkg_manager, manifest).await,
            SmokerEvent::PackFailed { error, .. } => self.on_pack_failed(ctx, error).await,
            SmokerEvent::InstallBegin {
                pkg_manager,
                package,
            } => self.on_install_begin(ctx, pkg_manager, package).await,
            SmokerEvent::InstallOk {
                pkg_manager,
                package,
                output,
            } => self.on_install_ok(ctx, pkg_manager, package, output).await,
            SmokerEvent::InstallFailed { error, .. } => self.on_install_failed(ctx, error).await,
            SmokerEvent::RuleBegin {
                pkg_manager,
                rule,
                package,
            } => self.on_rule_begin(ctx, pkg_manager, rule, package).await,
            SmokerEvent::RuleOk {
                pkg_manager,
                rule,
                package,
            } => self.on_rule_ok(ctx, pkg_manager, rule, package).await,
            SmokerEvent::RuleFailed {
                pkg_manager,
                rule,
                package,
                issues,
            } => {
                self.on_rule_failed(ctx, pkg_manager, rule, package, issues)
                    .await
            }
            SmokerEvent::RuleError { error } => self.on_rule_error(ctx, error).await,
            SmokerEvent::ScriptBegin {
                pkg_manager,
                package,
                script,
            } => self.on_script_begin(ctx, pkg_manager, package, script).await,
            SmokerEvent::ScriptOk {
                pkg_manager,
                package,
                script,
                output,
            } => {
                self.on_script_ok(ctx, pkg_manager, package, script, output)
                    .await
            }
            SmokerEvent::ScriptFailed {
                pkg_manager,
                package,
                script,
                output,
            } => {
                self.on_script_failed(ctx, pkg_manager, package, script, output)
                    .await
            }
            SmokerEvent::ScriptError { error } => self.on_script_error(ctx, error).await,
            SmokerEvent::ScriptSkipped {
                pkg_manager,
                package,
                script,
            } => {
                self.on_script_skipped(ctx, pkg_manager, package, script)
                    .await
            }
            SmokerEvent::Lingered { directories } => self.on_lingered(ctx, directories).await,
            SmokerEvent::SmokeOk { results } => self.on_smoke_ok(ctx, results).await,
            SmokerEvent::SmokeFailed { results } => self.on_smoke_failed(ctx, results).await,
            SmokerEvent::SmokeError { error } => self.on_smoke_error(ctx, error).await,
            SmokerEvent::SmokeAborted { results } => self.on_smoke_aborted(ctx, results).await,
        }
    }
}
