//! Domain entities for smoker.
//!
//! This module contains the data passed between actors:
//! - Workspace: a discovered package and its manifest
//! - Manifest: package manager specs, install and lint manifests
//! - Exec: output of one subprocess
//! - Rule: severities, issues and rule configuration
//! - Event: the ordered event stream
//! - Results: per-phase and aggregate outcomes

mod event;
mod exec;
mod manifest;
mod results;
mod rule;
mod workspace;

pub use event::SmokerEvent;
pub use exec::ExecOutput;
pub use manifest::{InstallManifest, LintManifest, PkgManagerRequest, PkgManagerSpec};
pub use results::{
    LintResult, PkgManagerOutcome, ScriptOutcome, ScriptResult, SmokeResults,
};
pub use rule::{RawRuleSetting, RuleConfig, RuleIssue, Severity};
pub use workspace::{PackageJson, WorkspaceInfo, WorkspacesField};
