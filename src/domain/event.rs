//! Events placed on the bus and delivered to reporters.

use super::{ExecOutput, InstallManifest, RuleIssue, SmokeResults};
use crate::error::{PkgManagerError, RuleError};
use serde::Serialize;
use std::path::PathBuf;

/// One event in the run's ordered stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SmokerEvent {
    SmokeBegin {
        pkg_managers: Vec<String>,
        workspaces: Vec<String>,
        rules: Vec<String>,
        scripts: Vec<String>,
    },
    PackBegin {
        pkg_manager: String,
        workspace: String,
    },
    PackOk {
        pkg_manager: String,
        manifest: InstallManifest,
    },
    PackFailed {
        pkg_manager: String,
        error: PkgManagerError,
    },
    InstallBegin {
        pkg_manager: String,
        package: String,
    },
    InstallOk {
        pkg_manager: String,
        package: String,
        output: ExecOutput,
    },
    InstallFailed {
        pkg_manager: String,
        error: PkgManagerError,
    },
    RuleBegin {
        pkg_manager: String,
        rule: String,
        package: String,
    },
    RuleOk {
        pkg_manager: String,
        rule: String,
        package: String,
    },
    RuleFailed {
        pkg_manager: String,
        rule: String,
        package: String,
        issues: Vec<RuleIssue>,
    },
    RuleError {
        error: RuleError,
    },
    ScriptBegin {
        pkg_manager: String,
        package: String,
        script: String,
    },
    ScriptOk {
        pkg_manager: String,
        package: String,
        script: String,
        output: ExecOutput,
    },
    ScriptFailed {
        pkg_manager: String,
        package: String,
        script: String,
        output: ExecOutput,
    },
    ScriptError {
        error: PkgManagerError,
    },
    ScriptSkipped {
        pkg_manager: String,
        package: String,
        script: String,
    },
    Lingered {
        directories: Vec<PathBuf>,
    },
    SmokeOk {
        results: Box<SmokeResults>,
    },
    SmokeFailed {
        results: Box<SmokeResults>,
    },
    SmokeError {
        error: String,
    },
    SmokeAborted {
        results: Box<SmokeResults>,
    },
}

impl SmokerEvent {
    /// The `type` tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SmokeBegin { .. } => "smoke-begin",
            Self::PackBegin { .. } => "pack-begin",
            Self::PackOk { .. } => "pack-ok",
            Self::PackFailed { .. } => "pack-failed",
            Self::InstallBegin { .. } => "install-begin",
            Self::InstallOk { .. } => "install-ok",
            Self::InstallFailed { .. } => "install-failed",
            Self::RuleBegin { .. } => "rule-begin",
            Self::RuleOk { .. } => "rule-ok",
            Self::RuleFailed { .. } => "rule-failed",
            Self::RuleError { .. } => "rule-error",
            Self::ScriptBegin { .. } => "script-begin",
            Self::ScriptOk { .. } => "script-ok",
            Self::ScriptFailed { .. } => "script-failed",
            Self::ScriptError { .. } => "script-error",
            Self::ScriptSkipped { .. } => "script-skipped",
            Self::Lingered { .. } => "lingered",
            Self::SmokeOk { .. } => "smoke-ok",
            Self::SmokeFailed { .. } => "smoke-failed",
            Self::SmokeError { .. } => "smoke-error",
            Self::SmokeAborted { .. } => "smoke-aborted",
        }
    }

    /// Terminal events end a reporter's stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SmokeOk { .. }
                | Self::SmokeFailed { .. }
                | Self::SmokeError { .. }
                | Self::SmokeAborted { .. }
        )
    }
}
