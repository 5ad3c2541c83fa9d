//! Package manager backend contract and its operation contexts.

use crate::domain::{ExecOutput, InstallManifest, LintManifest, PkgManagerSpec, WorkspaceInfo};
use crate::error::{ExecError, PackError};
use crate::services::{ExecOptions, Executor};
use async_trait::async_trait;
use semver::{Version, VersionReq};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state for every backend operation of one actor
#[derive(Clone)]
pub struct PkgManagerContext {
    pub spec: Arc<PkgManagerSpec>,
    /// The actor's private temporary directory
    pub tmpdir: PathBuf,
    pub executor: Arc<dyn Executor>,
    pub cancel: CancellationToken,
    pub verbose: bool,
}

impl PkgManagerContext {
    /// Run the package manager binary in `cwd`
    pub async fn exec(&self, args: &[&str], cwd: &Path) -> Result<ExecOutput, ExecError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let options = ExecOptions::in_dir(cwd).with_cancel(self.cancel.clone());
        self.executor.exec(&self.spec, &args, options).await
    }
}

impl std::fmt::Debug for PkgManagerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkgManagerContext")
            .field("spec", &self.spec.label())
            .field("tmpdir", &self.tmpdir)
            .finish()
    }
}

/// Pack one workspace
#[derive(Debug, Clone)]
pub struct PackContext {
    pub pm: PkgManagerContext,
    pub workspace: Arc<WorkspaceInfo>,
}

/// Install one packed artifact or additional dependency
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub pm: PkgManagerContext,
    pub manifest: InstallManifest,
}

/// Run one script in one installed package
#[derive(Debug, Clone)]
pub struct RunScriptContext {
    pub pm: PkgManagerContext,
    pub manifest: LintManifest,
    pub script: String,
}

/// A package manager backend such as npm
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Backend name, unique within its plugin
    fn name(&self) -> &str;

    /// Executable this backend drives, e.g. `npm`
    fn bin(&self) -> &str;

    /// Versions of `bin` this backend understands
    fn supported_versions(&self) -> VersionReq;

    /// Can several installs run at once in the same temp directory?
    fn concurrent_install(&self) -> bool {
        false
    }

    /// Does this backend accept a resolved version?
    fn accepts(&self, version: &Version) -> bool {
        self.supported_versions().matches(version)
    }

    /// Prepare the temp directory before packing
    async fn setup(&self, _ctx: &PkgManagerContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Undo `setup`; runs even when later phases failed
    async fn teardown(&self, _ctx: &PkgManagerContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Pack a workspace into an installable artifact
    async fn pack(&self, ctx: &PackContext) -> Result<InstallManifest, PackError>;

    /// Install an artifact; a non-zero exit is reported by the caller
    async fn install(&self, ctx: &InstallContext) -> anyhow::Result<ExecOutput>;

    /// Run a script in an installed package
    async fn run_script(&self, ctx: &RunScriptContext) -> anyhow::Result<ExecOutput>;
}
