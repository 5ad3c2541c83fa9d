//! Package manager actor.
//!
//! One actor per resolved spec drives its backend through
//! setup → pack → install → lint/run-scripts → teardown, then prunes its
//! temporary directory. Each phase hands the next a new manifest type.

use super::bus::EventSender;
use super::rule::{RuleActor, RuleOutcome};
use crate::config::SmokerConfig;
use crate::domain::{
    ExecOutput, InstallManifest, LintManifest, PkgManagerOutcome, PkgManagerSpec, RuleConfig,
    ScriptOutcome, ScriptResult, SmokerEvent, WorkspaceInfo,
};
use crate::error::{MachineError, PkgManagerError};
use crate::plugin::{
    Component, InstallContext, PackContext, PackageManager, PkgManagerContext, Rule,
    RunScriptContext,
};
use crate::services::loader::{create_temp_dir, read_package_json};
use crate::services::{guarded, Cancelled, Executor, OrCancelExt};
use futures::{stream, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Lifecycle states of a package manager actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgManagerState {
    Idle,
    Setup,
    Packing,
    Installing,
    Linting,
    RunningScripts,
    Teardown,
    Done,
    Errored,
    Aborted,
}

impl PkgManagerState {
    /// Done, errored and aborted are final
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored | Self::Aborted)
    }

    /// Is `self → next` a legal transition?
    pub fn can_transition(self, next: Self) -> bool {
        use PkgManagerState::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Errored | Aborted => true,
            Setup => self == Idle,
            Packing => self == Setup,
            Installing => self == Packing,
            Linting => self == Installing,
            RunningScripts => matches!(self, Installing | Linting),
            Teardown => matches!(self, Packing | Installing | Linting | RunningScripts),
            Done => self == Teardown,
            Idle => false,
        }
    }
}

impl fmt::Display for PkgManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Setup => "setup",
            Self::Packing => "packing",
            Self::Installing => "installing",
            Self::Linting => "linting",
            Self::RunningScripts => "running-scripts",
            Self::Teardown => "teardown",
            Self::Done => "done",
            Self::Errored => "errored",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// What every package manager actor in a run should do
#[derive(Clone)]
pub struct RunPlan {
    /// Enabled rules with their resolved configs; empty when not linting
    pub rules: Vec<(Component<dyn Rule>, RuleConfig)>,
    pub scripts: Vec<String>,
    pub add: Vec<String>,
    pub bail: bool,
    pub loose: bool,
    pub linger: bool,
    pub verbose: bool,
    pub concurrency: usize,
    pub tmp_root: PathBuf,
    pub grace_period: Duration,
}

impl RunPlan {
    /// Build a plan from options and the enabled rules
    pub fn new(config: &SmokerConfig, rules: Vec<(Component<dyn Rule>, RuleConfig)>) -> Self {
        Self {
            rules,
            scripts: config.scripts.clone(),
            add: config.add.clone(),
            bail: config.bail,
            loose: config.loose,
            linger: config.linger,
            verbose: config.verbose,
            concurrency: config.concurrency.max(1),
            tmp_root: config.tmp_root(),
            grace_period: config.grace_period(),
        }
    }
}

/// Why the phases stopped early
enum Interrupt {
    Cancelled,
    Machine(MachineError),
}

impl From<Cancelled> for Interrupt {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<MachineError> for Interrupt {
    fn from(e: MachineError) -> Self {
        Self::Machine(e)
    }
}

type PhaseResult<T> = std::result::Result<T, Interrupt>;

/// Drives one backend for one spec
pub struct PkgManagerActor {
    spec: Arc<PkgManagerSpec>,
    label: String,
    backend: Component<dyn PackageManager>,
    workspaces: Vec<Arc<WorkspaceInfo>>,
    plan: Arc<RunPlan>,
    executor: Arc<dyn Executor>,
    events: EventSender,
    cancel: CancellationToken,
    state: PkgManagerState,
}

impl PkgManagerActor {
    pub fn new(
        spec: Arc<PkgManagerSpec>,
        backend: Component<dyn PackageManager>,
        workspaces: Vec<Arc<WorkspaceInfo>>,
        plan: Arc<RunPlan>,
        executor: Arc<dyn Executor>,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label: spec.label(),
            spec,
            backend,
            workspaces,
            plan,
            executor,
            events,
            cancel,
            state: PkgManagerState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> PkgManagerState {
        self.state
    }

    fn transition(&mut self, next: PkgManagerState) -> Result<(), MachineError> {
        if !self.state.can_transition(next) {
            return Err(MachineError::new(
                format!("package manager {}", self.label),
                format!("illegal transition {} -> {}", self.state, next),
            ));
        }
        tracing::debug!("{}: {} -> {}", self.label, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Run the whole lifecycle.
    ///
    /// Domain failures are recorded in the outcome; only a fault in the
    /// state machine itself is returned as an error.
    pub async fn run(mut self) -> Result<PkgManagerOutcome, MachineError> {
        let mut outcome = PkgManagerOutcome::new((*self.spec).clone());
        self.transition(PkgManagerState::Setup)?;

        let tmpdir = match create_temp_dir(&self.plan.tmp_root, &self.spec)
            .or_cancel(&self.cancel)
            .await
        {
            Err(Cancelled) => {
                outcome.aborted = true;
                self.transition(PkgManagerState::Aborted)?;
                return Ok(outcome);
            }
            Ok(Err(e)) => {
                outcome.fatal = Some(PkgManagerError::TempDir {
                    pkg_manager: self.label.clone(),
                    message: e.to_string(),
                });
                self.transition(PkgManagerState::Errored)?;
                return Ok(outcome);
            }
            Ok(Ok(dir)) => dir,
        };

        let ctx = PkgManagerContext {
            spec: Arc::clone(&self.spec),
            tmpdir: tmpdir.path().to_path_buf(),
            executor: Arc::clone(&self.executor),
            cancel: self.cancel.clone(),
            verbose: self.plan.verbose,
        };

        let backend = Arc::clone(&self.backend.payload);
        match guarded(backend.setup(&ctx)).or_cancel(&self.cancel).await {
            Err(Cancelled) => {
                outcome.aborted = true;
                self.prune(tmpdir, &mut outcome).await;
                self.transition(PkgManagerState::Aborted)?;
                return Ok(outcome);
            }
            Ok(Err(message)) => {
                tracing::warn!("{} setup failed: {}", self.label, message);
                outcome.fatal = Some(PkgManagerError::Setup {
                    pkg_manager: self.label.clone(),
                    message,
                });
                self.prune(tmpdir, &mut outcome).await;
                self.transition(PkgManagerState::Errored)?;
                return Ok(outcome);
            }
            Ok(Ok(())) => {}
        }

        let phases = self.run_phases(&ctx, &mut outcome).await;
        let machine = match phases {
            Ok(()) => None,
            Err(Interrupt::Cancelled) => {
                outcome.aborted = true;
                None
            }
            Err(Interrupt::Machine(e)) => Some(e),
        };
        if self.cancel.is_cancelled() {
            outcome.aborted = true;
        }
        if machine.is_none() {
            self.transition(PkgManagerState::Teardown)?;
        }

        self.teardown(&ctx, &mut outcome).await;
        self.prune(tmpdir, &mut outcome).await;

        if let Some(e) = machine {
            self.state = PkgManagerState::Errored;
            return Err(e);
        }
        let last = if outcome.aborted {
            PkgManagerState::Aborted
        } else if outcome.fatal.is_some() {
            PkgManagerState::Errored
        } else {
            PkgManagerState::Done
        };
        self.transition(last)?;
        Ok(outcome)
    }

    async fn run_phases(
        &mut self,
        ctx: &PkgManagerContext,
        outcome: &mut PkgManagerOutcome,
    ) -> PhaseResult<()> {
        self.transition(PkgManagerState::Packing)?;
        let manifests = self.pack_all(ctx, outcome).await?;
        if outcome.fatal.is_some() {
            return Ok(());
        }

        self.transition(PkgManagerState::Installing)?;
        let installed = self.install_all(ctx, manifests, outcome).await?;

        let lint = !self.plan.rules.is_empty();
        if lint {
            self.transition(PkgManagerState::Linting)?;
            self.lint_all(&installed, outcome).await?;
        }

        if !self.plan.scripts.is_empty() {
            self.transition(PkgManagerState::RunningScripts)?;
            self.run_scripts(ctx, &installed, outcome).await?;
        }
        Ok(())
    }

    /// Pack every workspace; a fatal pack error stops the remaining packs
    async fn pack_all(
        &self,
        ctx: &PkgManagerContext,
        outcome: &mut PkgManagerOutcome,
    ) -> PhaseResult<Vec<InstallManifest>> {
        let backend = &self.backend.payload;
        let mut packs = stream::iter(self.workspaces.iter().cloned().enumerate())
            .map(|(index, workspace)| {
                let pack_ctx = PackContext {
                    pm: ctx.clone(),
                    workspace: Arc::clone(&workspace),
                };
                self.events.emit(SmokerEvent::PackBegin {
                    pkg_manager: self.label.clone(),
                    workspace: workspace.name().to_string(),
                });
                async move {
                    let packed = guarded(async { Ok(backend.pack(&pack_ctx).await) }).await;
                    (index, workspace, packed)
                }
            })
            .buffer_unordered(self.plan.concurrency);

        let mut manifests = Vec::new();
        loop {
            let next = packs.next().or_cancel(&self.cancel).await?;
            let Some((index, workspace, packed)) = next else {
                break;
            };
            let failure = match packed {
                Ok(Ok(manifest)) => {
                    self.events.emit(SmokerEvent::PackOk {
                        pkg_manager: self.label.clone(),
                        manifest: manifest.clone(),
                    });
                    manifests.push((index, manifest));
                    continue;
                }
                Ok(Err(e)) => (e.message, e.output, e.fatal),
                Err(message) => (message, None, true),
            };
            let (message, output, fatal) = failure;
            let error = PkgManagerError::Pack {
                pkg_manager: self.label.clone(),
                workspace: workspace.name().to_string(),
                message,
                output,
            };
            tracing::warn!("{}", error);
            self.events.emit(SmokerEvent::PackFailed {
                pkg_manager: self.label.clone(),
                error: error.clone(),
            });
            if fatal {
                outcome.fatal = Some(error);
                break;
            }
            outcome.pack_errors.push(error);
        }
        drop(packs);

        manifests.sort_by_key(|(index, _)| *index);
        let mut manifests: Vec<_> = manifests.into_iter().map(|(_, m)| m).collect();
        outcome.packed = manifests.clone();

        if outcome.fatal.is_none() && !manifests.is_empty() {
            manifests.extend(
                self.plan
                    .add
                    .iter()
                    .map(|dep| InstallManifest::additional(dep, ctx.tmpdir.clone())),
            );
        }
        Ok(manifests)
    }

    /// Install every manifest and read back what was installed
    async fn install_all(
        &self,
        ctx: &PkgManagerContext,
        manifests: Vec<InstallManifest>,
        outcome: &mut PkgManagerOutcome,
    ) -> PhaseResult<Vec<LintManifest>> {
        let backend = &self.backend.payload;
        let limit = if backend.concurrent_install() {
            self.plan.concurrency
        } else {
            1
        };

        let mut installs = stream::iter(manifests.into_iter().enumerate())
            .map(|(index, manifest)| {
                let install_ctx = InstallContext {
                    pm: ctx.clone(),
                    manifest: manifest.clone(),
                };
                async move {
                    self.events.emit(SmokerEvent::InstallBegin {
                        pkg_manager: self.label.clone(),
                        package: manifest.pkg_name.clone(),
                    });
                    let installed = guarded(backend.install(&install_ctx)).await;
                    (index, manifest, installed)
                }
            })
            .buffer_unordered(limit);

        let mut lint_manifests = Vec::new();
        loop {
            let next = installs.next().or_cancel(&self.cancel).await?;
            let Some((index, manifest, installed)) = next else {
                break;
            };
            let output = match installed {
                Ok(output) if output.succeeded() => output,
                Ok(output) => {
                    let message = format!(
                        "exited with code {}: {}",
                        output.exit_code,
                        output.diagnostic()
                    );
                    self.install_failed(&manifest, message, Some(output), outcome);
                    continue;
                }
                Err(message) => {
                    self.install_failed(&manifest, message, None, outcome);
                    continue;
                }
            };

            self.events.emit(SmokerEvent::InstallOk {
                pkg_manager: self.label.clone(),
                package: manifest.pkg_name.clone(),
                output,
            });
            outcome.installed.push(manifest.pkg_name.clone());

            let Some(workspace) = manifest.workspace.clone() else {
                continue;
            };
            match read_package_json(&manifest.install_path)
                .or_cancel(&self.cancel)
                .await?
            {
                Ok((installed_manifest, _)) => lint_manifests.push((
                    index,
                    LintManifest::new(manifest.install_path.clone(), installed_manifest, workspace),
                )),
                Err(e) => {
                    let message = format!("installed package is unreadable: {e}");
                    self.install_failed(&manifest, message, None, outcome);
                }
            }
        }

        lint_manifests.sort_by_key(|(index, _)| *index);
        Ok(lint_manifests.into_iter().map(|(_, m)| m).collect())
    }

    fn install_failed(
        &self,
        manifest: &InstallManifest,
        message: String,
        output: Option<ExecOutput>,
        outcome: &mut PkgManagerOutcome,
    ) {
        let error = PkgManagerError::Install {
            pkg_manager: self.label.clone(),
            package: manifest.pkg_name.clone(),
            message,
            output,
        };
        tracing::warn!("{}", error);
        self.events.emit(SmokerEvent::InstallFailed {
            pkg_manager: self.label.clone(),
            error: error.clone(),
        });
        outcome.install_errors.push(error);
    }

    /// One rule actor per enabled rule per installed package
    async fn lint_all(
        &self,
        installed: &[LintManifest],
        outcome: &mut PkgManagerOutcome,
    ) -> PhaseResult<()> {
        let actors: Vec<RuleActor> = installed
            .iter()
            .flat_map(|manifest| {
                self.plan.rules.iter().map(move |(rule, config)| {
                    RuleActor::new(
                        rule.clone(),
                        config.clone(),
                        manifest.clone(),
                        self.label.clone(),
                        self.events.clone(),
                        self.cancel.child_token(),
                    )
                })
            })
            .collect();

        let mut checks = stream::iter(actors)
            .map(RuleActor::run)
            .buffer_unordered(self.plan.concurrency);

        let mut aborted = false;
        while let Some(rule_outcome) = checks.next().await {
            match rule_outcome {
                RuleOutcome::Checked(result) => outcome.lint.push(result),
                RuleOutcome::Faulted(error) => outcome.rule_errors.push(error),
                RuleOutcome::Aborted => aborted = true,
            }
        }
        outcome
            .lint
            .sort_by(|a, b| (&a.package_id, &a.rule_id).cmp(&(&b.package_id, &b.rule_id)));

        if aborted || self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        Ok(())
    }

    /// Run scripts sequentially in every installed package
    async fn run_scripts(
        &self,
        ctx: &PkgManagerContext,
        installed: &[LintManifest],
        outcome: &mut PkgManagerOutcome,
    ) -> PhaseResult<()> {
        let backend = &self.backend.payload;

        for manifest in installed {
            let package = manifest.package_id();
            for script in &self.plan.scripts {
                let result = if !manifest.manifest.has_script(script) {
                    self.missing_script(&package, script)
                } else {
                    self.events.emit(SmokerEvent::ScriptBegin {
                        pkg_manager: self.label.clone(),
                        package: package.clone(),
                        script: script.clone(),
                    });
                    let run_ctx = RunScriptContext {
                        pm: ctx.clone(),
                        manifest: manifest.clone(),
                        script: script.clone(),
                    };
                    let ran = guarded(backend.run_script(&run_ctx))
                        .or_cancel(&self.cancel)
                        .await?;
                    self.script_finished(&package, script, ran)
                };

                let failed = result.outcome.is_failure();
                outcome.scripts.push(result);
                if failed && self.plan.bail {
                    tracing::info!("{}: bailing after failed script {}", self.label, script);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn missing_script(&self, package: &str, script: &str) -> ScriptResult {
        let outcome = if self.plan.loose {
            self.events.emit(SmokerEvent::ScriptSkipped {
                pkg_manager: self.label.clone(),
                package: package.to_string(),
                script: script.to_string(),
            });
            ScriptOutcome::Skipped
        } else {
            let error = PkgManagerError::UnknownScript {
                pkg_manager: self.label.clone(),
                package: package.to_string(),
                script: script.to_string(),
            };
            self.events.emit(SmokerEvent::ScriptError {
                error: error.clone(),
            });
            ScriptOutcome::Error { error }
        };
        ScriptResult {
            package_id: package.to_string(),
            script: script.to_string(),
            outcome,
        }
    }

    fn script_finished(
        &self,
        package: &str,
        script: &str,
        ran: Result<ExecOutput, String>,
    ) -> ScriptResult {
        let outcome = match ran {
            Ok(output) if output.succeeded() => {
                self.events.emit(SmokerEvent::ScriptOk {
                    pkg_manager: self.label.clone(),
                    package: package.to_string(),
                    script: script.to_string(),
                    output: output.clone(),
                });
                ScriptOutcome::Passed { output }
            }
            Ok(output) => {
                self.events.emit(SmokerEvent::ScriptFailed {
                    pkg_manager: self.label.clone(),
                    package: package.to_string(),
                    script: script.to_string(),
                    output: output.clone(),
                });
                ScriptOutcome::Failed { output }
            }
            Err(message) => {
                let error = PkgManagerError::Script {
                    pkg_manager: self.label.clone(),
                    package: package.to_string(),
                    script: script.to_string(),
                    message,
                };
                self.events.emit(SmokerEvent::ScriptError {
                    error: error.clone(),
                });
                ScriptOutcome::Error { error }
            }
        };
        ScriptResult {
            package_id: package.to_string(),
            script: script.to_string(),
            outcome,
        }
    }

    /// Best-effort teardown, bounded by the grace period once cancelled
    async fn teardown(&self, ctx: &PkgManagerContext, outcome: &mut PkgManagerOutcome) {
        let backend = &self.backend.payload;
        let torn_down = guarded(backend.teardown(ctx));
        let torn_down = if self.cancel.is_cancelled() {
            tokio::time::timeout(self.plan.grace_period, torn_down)
                .await
                .unwrap_or_else(|_| Err("timed out".to_string()))
        } else {
            torn_down.await
        };
        let Err(message) = torn_down else {
            return;
        };

        if outcome.aborted {
            tracing::warn!("{} teardown after abort failed: {}", self.label, message);
            outcome.cleanup_warnings.push(format!("teardown: {message}"));
            return;
        }
        tracing::warn!("{} teardown failed: {}", self.label, message);
        let error = PkgManagerError::Teardown {
            pkg_manager: self.label.clone(),
            message,
        };
        if outcome.fatal.is_none() {
            outcome.fatal = Some(error);
        }
    }

    /// Remove the temp directory, or keep it under `linger`
    async fn prune(&self, tmpdir: TempDir, outcome: &mut PkgManagerOutcome) {
        if self.plan.linger && !outcome.aborted {
            #[allow(deprecated)]
            let kept = tmpdir.into_path();
            tracing::info!("{}: keeping {:?}", self.label, kept);
            outcome.lingered = Some(kept);
            return;
        }

        let path = tmpdir.path().to_path_buf();
        let closed = tokio::task::spawn_blocking(move || tmpdir.close()).await;
        let failure = match closed {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        tracing::warn!("{}: could not remove {:?}: {}", self.label, path, failure);
        outcome
            .cleanup_warnings
            .push(format!("remove {}: {failure}", path.display()));
    }
}
