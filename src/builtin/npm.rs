//! npm backend.

use crate::domain::{ExecOutput, InstallManifest};
use crate::error::{ExecError, PackError};
use crate::plugin::{InstallContext, PackContext, PackageManager, PkgManagerContext, RunScriptContext};
use anyhow::Context;
use async_trait::async_trait;
use semver::VersionReq;
use serde::Deserialize;
use std::sync::OnceLock;

/// npm versions this backend drives
const SUPPORTED: &str = ">=7";

/// Manifest written into the temp directory so installs stay sandboxed
const SANDBOX_MANIFEST: &str = r#"{
  "name": "smoker-sandbox",
  "version": "0.0.0",
  "private": true,
  "description": "Temporary install target"
}
"#;

fn supported() -> &'static VersionReq {
    static REQ: OnceLock<VersionReq> = OnceLock::new();
    REQ.get_or_init(|| VersionReq::parse(SUPPORTED).expect("npm version range is valid"))
}

/// One entry of `npm pack --json`
#[derive(Debug, Deserialize)]
struct PackEntry {
    filename: String,
}

/// Parse the tarball file name out of `npm pack --json` output.
///
/// Lifecycle scripts may print before the JSON array.
fn parse_pack_output(stdout: &str) -> Result<String, String> {
    let start = stdout
        .find('[')
        .ok_or_else(|| "npm pack printed no JSON".to_string())?;
    let entries: Vec<PackEntry> =
        serde_json::from_str(&stdout[start..]).map_err(|e| format!("bad npm pack JSON: {e}"))?;
    entries
        .into_iter()
        .next()
        .map(|entry| entry.filename)
        .ok_or_else(|| "npm pack produced no tarball".to_string())
}

/// The npm package manager
#[derive(Debug, Clone, Default)]
pub struct Npm;

#[async_trait]
impl PackageManager for Npm {
    fn name(&self) -> &str {
        "npm"
    }

    fn bin(&self) -> &str {
        "npm"
    }

    fn supported_versions(&self) -> VersionReq {
        supported().clone()
    }

    async fn setup(&self, ctx: &PkgManagerContext) -> anyhow::Result<()> {
        let path = ctx.tmpdir.join("package.json");
        tokio::fs::write(&path, SANDBOX_MANIFEST)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    async fn pack(&self, ctx: &PackContext) -> Result<InstallManifest, PackError> {
        let dest = ctx.pm.tmpdir.to_string_lossy().into_owned();
        let args = ["pack", "--json", "--pack-destination", dest.as_str()];

        let output = ctx
            .pm
            .exec(&args, &ctx.workspace.path)
            .await
            .map_err(|e| match e {
                ExecError::Aborted { .. } => PackError::new(e.to_string()).fatal(),
                // A missing binary fails every workspace the same way
                ExecError::Spawn { .. } => PackError::new(e.to_string()).fatal(),
            })?;

        if !output.succeeded() {
            let message = format!(
                "npm pack exited with code {}: {}",
                output.exit_code,
                output.diagnostic()
            );
            return Err(PackError::new(message).with_output(output));
        }

        let filename =
            parse_pack_output(&output.stdout).map_err(|m| PackError::new(m).with_output(output))?;
        Ok(InstallManifest::for_workspace(
            ctx.workspace.clone(),
            ctx.pm.tmpdir.join(filename),
            ctx.pm.tmpdir.clone(),
        ))
    }

    async fn install(&self, ctx: &InstallContext) -> anyhow::Result<ExecOutput> {
        let args = [
            "install",
            "--no-audit",
            "--no-fund",
            "--no-package-lock",
            ctx.manifest.pkg_spec.as_str(),
        ];
        let output = ctx.pm.exec(&args, &ctx.manifest.cwd).await?;
        Ok(output)
    }

    async fn run_script(&self, ctx: &RunScriptContext) -> anyhow::Result<ExecOutput> {
        let args = ["run", ctx.script.as_str()];
        let output = ctx.pm.exec(&args, &ctx.manifest.install_path).await?;
        Ok(output)
    }
}
