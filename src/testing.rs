//! Test doubles shared by the unit tests.

use crate::config::SmokerConfig;
use crate::domain::{ExecOutput, InstallManifest, PkgManagerSpec, SmokerEvent, WorkspaceInfo};
use crate::error::{ExecError, PackError};
use crate::plugin::{
    InstallContext, PackContext, PackageManager, PkgManagerContext, Reporter, ReporterContext,
    Rule, RuleContext, RunScriptContext,
};
use crate::services::{ExecOptions, Executor};
use anyhow::bail;
use async_trait::async_trait;
use semver::VersionReq;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

/// A workspace written to a temporary directory
pub struct TestWorkspace {
    pub dir: TempDir,
    pub info: WorkspaceInfo,
}

/// Write `package.json` plus extra files and load them as a workspace
pub fn workspace(manifest: &str, files: &[(&str, &str)]) -> TestWorkspace {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("package.json"), manifest).unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
    let info = WorkspaceInfo::new(dir.path().to_path_buf(), manifest.to_string(), true).unwrap();
    TestWorkspace { dir, info }
}

fn copy_dir(src: &Path, dst: &Path) -> anyhow::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let target = dst.join(entry.path().strip_prefix(src)?);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

/// One recorded executor invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// Executor that records calls and answers from canned responses
#[derive(Clone, Default)]
pub struct FakeExecutor {
    responses: Vec<(String, i32, String)>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeExecutor {
    /// Answer any call containing `needle` as an argument
    pub fn respond(mut self, needle: &str, code: i32, stdout: &str) -> Self {
        self.responses
            .push((needle.to_string(), code, stdout.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn exec(
        &self,
        spec: &PkgManagerSpec,
        args: &[String],
        options: ExecOptions,
    ) -> Result<ExecOutput, ExecError> {
        let command = format!("{} {}", spec.bin, args.join(" "));
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(ExecError::Aborted { command });
        }
        self.calls.lock().unwrap().push(Call {
            args: args.to_vec(),
            cwd: options.cwd,
        });

        let (code, stdout) = self
            .responses
            .iter()
            .find(|(needle, _, _)| args.iter().any(|a| a == needle))
            .map(|(_, code, stdout)| (*code, stdout.clone()))
            .unwrap_or((0, String::new()));
        Ok(ExecOutput::new(command, code, stdout, "", Duration::ZERO))
    }
}

/// Package manager backend that works on the local filesystem
#[derive(Clone)]
pub struct FakePackageManager {
    bin: String,
    versions: VersionReq,
    script_exits: HashMap<String, i32>,
    failing_installs: HashSet<String>,
    failing_pack: Option<(String, bool)>,
    failing_setup: bool,
    install_delay: Option<Duration>,
    teardown_delay: Option<Duration>,
    panics_on_concurrency: bool,
    setup_calls: Arc<AtomicUsize>,
    teardown_calls: Arc<AtomicUsize>,
}

impl FakePackageManager {
    pub fn new(bin: &str, versions: &str) -> Self {
        Self {
            bin: bin.to_string(),
            versions: VersionReq::parse(versions).unwrap(),
            script_exits: HashMap::new(),
            failing_installs: HashSet::new(),
            failing_pack: None,
            failing_setup: false,
            install_delay: None,
            teardown_delay: None,
            panics_on_concurrency: false,
            setup_calls: Arc::default(),
            teardown_calls: Arc::default(),
        }
    }

    pub fn with_script_exit(mut self, script: &str, code: i32) -> Self {
        self.script_exits.insert(script.to_string(), code);
        self
    }

    pub fn failing_install(mut self, pkg_name: &str) -> Self {
        self.failing_installs.insert(pkg_name.to_string());
        self
    }

    pub fn failing_pack(mut self, pkg_name: &str, fatal: bool) -> Self {
        self.failing_pack = Some((pkg_name.to_string(), fatal));
        self
    }

    pub fn failing_setup(mut self) -> Self {
        self.failing_setup = true;
        self
    }

    pub fn with_install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = Some(delay);
        self
    }

    pub fn with_teardown_delay(mut self, delay: Duration) -> Self {
        self.teardown_delay = Some(delay);
        self
    }

    /// Panic from the synchronous `concurrent_install` query
    pub fn panicking_on_concurrency(mut self) -> Self {
        self.panics_on_concurrency = true;
        self
    }

    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    fn output(&self, args: &str, code: i32, stderr: &str) -> ExecOutput {
        ExecOutput::new(format!("{} {}", self.bin, args), code, "", stderr, Duration::ZERO)
    }
}

#[async_trait]
impl PackageManager for FakePackageManager {
    fn name(&self) -> &str {
        &self.bin
    }

    fn bin(&self) -> &str {
        &self.bin
    }

    fn supported_versions(&self) -> VersionReq {
        self.versions.clone()
    }

    fn concurrent_install(&self) -> bool {
        if self.panics_on_concurrency {
            panic!("{} cannot tell", self.bin);
        }
        false
    }

    async fn setup(&self, _ctx: &PkgManagerContext) -> anyhow::Result<()> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_setup {
            bail!("setup refused");
        }
        Ok(())
    }

    async fn teardown(&self, _ctx: &PkgManagerContext) -> anyhow::Result<()> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.teardown_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn pack(&self, ctx: &PackContext) -> Result<InstallManifest, PackError> {
        let name = ctx.workspace.name();
        if let Some((failing, fatal)) = &self.failing_pack {
            if failing == name {
                let error = PackError::new(format!("cannot pack {name}"))
                    .with_output(self.output("pack", 1, "pack failed"));
                return Err(if *fatal { error.fatal() } else { error });
            }
        }
        Ok(InstallManifest::for_workspace(
            Arc::clone(&ctx.workspace),
            ctx.pm.tmpdir.join(format!("{name}.tgz")),
            ctx.pm.tmpdir.clone(),
        ))
    }

    async fn install(&self, ctx: &InstallContext) -> anyhow::Result<ExecOutput> {
        if let Some(delay) = self.install_delay {
            tokio::time::sleep(delay).await;
        }
        let manifest = &ctx.manifest;
        let args = format!("install {}", manifest.pkg_spec);
        if self.failing_installs.contains(&manifest.pkg_name) {
            return Ok(self.output(&args, 1, "ERR! install failed"));
        }

        match &manifest.workspace {
            Some(ws) => copy_dir(&ws.path, &manifest.install_path)?,
            None => {
                std::fs::create_dir_all(&manifest.install_path)?;
                let pkg = json!({"name": manifest.pkg_name, "version": "1.0.0"});
                std::fs::write(manifest.install_path.join("package.json"), pkg.to_string())?;
            }
        }
        Ok(self.output(&args, 0, ""))
    }

    async fn run_script(&self, ctx: &RunScriptContext) -> anyhow::Result<ExecOutput> {
        let code = self.script_exits.get(&ctx.script).copied().unwrap_or(0);
        let stderr = if code == 0 { "" } else { "script failed" };
        Ok(self.output(&format!("run {}", ctx.script), code, stderr))
    }
}

/// Rule that reports a fixed list of issues
#[derive(Clone)]
pub struct StaticRule {
    name: String,
    issues: Vec<String>,
}

impl StaticRule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            issues: Vec::new(),
        }
    }

    pub fn with_issue(mut self, message: &str) -> Self {
        self.issues.push(message.to_string());
        self
    }
}

#[async_trait]
impl Rule for StaticRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Reports fixed issues"
    }

    async fn check(&self, ctx: &RuleContext, _options: &Value) -> anyhow::Result<()> {
        for issue in &self.issues {
            ctx.add_issue(issue.clone(), None);
        }
        Ok(())
    }
}

/// Rule whose check errors or panics
#[derive(Clone)]
pub struct FaultyRule {
    name: String,
    panics: bool,
}

impl FaultyRule {
    pub fn erroring(name: &str) -> Self {
        Self {
            name: name.to_string(),
            panics: false,
        }
    }

    pub fn panicking(name: &str) -> Self {
        Self {
            name: name.to_string(),
            panics: true,
        }
    }
}

#[async_trait]
impl Rule for FaultyRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always faults"
    }

    async fn check(&self, ctx: &RuleContext, _options: &Value) -> anyhow::Result<()> {
        ctx.add_issue("partial", None);
        if self.panics {
            panic!("rule {} exploded", self.name);
        }
        bail!("rule {} broke", self.name)
    }
}

/// Reporter that records what it saw
#[derive(Clone)]
pub struct RecordingReporter {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    setup_delay: Option<Duration>,
    failing_on: Option<String>,
    panicking_on: Option<String>,
}

impl RecordingReporter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::default(),
            setup_delay: None,
            failing_on: None,
            panicking_on: None,
        }
    }

    pub fn with_setup_delay(mut self, delay: Duration) -> Self {
        self.setup_delay = Some(delay);
        self
    }

    /// Fail the hook for `kind`; `"setup"` fails setup
    pub fn failing_on(mut self, kind: &str) -> Self {
        self.failing_on = Some(kind.to_string());
        self
    }

    pub fn panicking_on(mut self, kind: &str) -> Self {
        self.panicking_on = Some(kind.to_string());
        self
    }

    /// Hooks that completed, in order
    pub fn kinds(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, kind: &str) {
        self.log.lock().unwrap().push(kind.to_string());
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records events"
    }

    fn enabled(&self, _config: &SmokerConfig) -> bool {
        true
    }

    async fn setup(&self, _ctx: &ReporterContext) -> anyhow::Result<()> {
        if let Some(delay) = self.setup_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_on.as_deref() == Some("setup") {
            bail!("setup refused");
        }
        self.record("setup");
        Ok(())
    }

    async fn teardown(&self, _ctx: &ReporterContext) -> anyhow::Result<()> {
        self.record("teardown");
        Ok(())
    }

    async fn on_event(&self, _ctx: &ReporterContext, event: &SmokerEvent) -> anyhow::Result<()> {
        let kind = event.kind();
        if self.panicking_on.as_deref() == Some(kind) {
            panic!("reporter {} exploded on {kind}", self.name);
        }
        if self.failing_on.as_deref() == Some(kind) {
            bail!("reporter {} failed on {kind}", self.name);
        }
        self.record(kind);
        Ok(())
    }
}
