//! Root coordinator.
//!
//! Selects components, resolves package managers, starts reporters and the
//! bus, spawns one package manager actor per spec and aggregates their
//! outcomes into [`SmokeResults`].

use super::bus::EventBus;
use super::pkg_manager::{PkgManagerActor, RunPlan};
use super::reporter::ReporterActor;
use super::rule::resolve_rule_configs;
use crate::config::SmokerConfig;
use crate::domain::{PkgManagerOutcome, PkgManagerSpec, SmokeResults, SmokerEvent, WorkspaceInfo};
use crate::error::{MachineError, ReporterError, SmokerError, UnsupportedPackageManagerError};
use crate::plugin::{Component, PluginRegistry, Reporter};
use crate::services::guard::panic_message;
use crate::services::loader::{resolve_pkg_managers, ResolvedPkgManager};
use crate::services::Executor;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle states of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokerState {
    Idle,
    LoadingPlugins,
    LoadingPkgManagers,
    SpawningPkgManagers,
    AwaitingResults,
    Reporting,
    Done,
    Errored,
    Aborted,
}

impl SmokerState {
    /// Done, errored and aborted are final
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored | Self::Aborted)
    }

    /// Is `self → next` a legal transition?
    pub fn can_transition(self, next: Self) -> bool {
        use SmokerState::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Errored | Aborted => true,
            LoadingPlugins => self == Idle,
            LoadingPkgManagers => self == LoadingPlugins,
            SpawningPkgManagers => self == LoadingPkgManagers,
            AwaitingResults => self == SpawningPkgManagers,
            Reporting => self == AwaitingResults,
            Done => self == Reporting,
            Idle => false,
        }
    }
}

impl fmt::Display for SmokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::LoadingPlugins => "loading-plugins",
            Self::LoadingPkgManagers => "loading-pkg-managers",
            Self::SpawningPkgManagers => "spawning-pkg-managers",
            Self::AwaitingResults => "awaiting-results",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Errored => "errored",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Workspaces assigned to one resolved package manager
struct Assignment {
    resolved: ResolvedPkgManager,
    workspaces: Vec<Arc<WorkspaceInfo>>,
}

/// Split workspaces between package managers.
///
/// A workspace declaring `packageManager` only goes to actors with that
/// binary. Private workspaces are dropped unless allowed.
fn partition(
    workspaces: &[Arc<WorkspaceInfo>],
    resolved: Vec<ResolvedPkgManager>,
    allow_private: bool,
) -> (Vec<Assignment>, Vec<UnsupportedPackageManagerError>) {
    let mut assignments: Vec<Assignment> = resolved
        .into_iter()
        .map(|resolved| Assignment {
            resolved,
            workspaces: Vec::new(),
        })
        .collect();
    let mut unsupported = Vec::new();

    for ws in workspaces {
        if ws.is_private() && !allow_private {
            tracing::info!("Skipping private workspace {}", ws.name());
            continue;
        }
        let declared = ws.declared_pkg_manager();
        let mut assigned = false;
        for assignment in &mut assignments {
            if declared.map_or(true, |bin| bin == assignment.resolved.spec.bin) {
                assignment.workspaces.push(Arc::clone(ws));
                assigned = true;
            }
        }
        if !assigned {
            let error = UnsupportedPackageManagerError {
                requested: declared.unwrap_or_default().to_string(),
                workspace: Some(ws.name().to_string()),
            };
            tracing::warn!("{}", error);
            unsupported.push(error);
        }
    }
    (assignments, unsupported)
}

/// Outcomes gathered from package manager actors
struct Collected {
    outcomes: Vec<PkgManagerOutcome>,
    machine: Option<MachineError>,
}

/// Where the coordinator is while waiting on its actors
enum Wait {
    Running,
    Grace(Instant),
    Forced,
}

/// The root coordinator
pub struct Smoker {
    config: Arc<SmokerConfig>,
    registry: Arc<PluginRegistry>,
    state: SmokerState,
}

impl Smoker {
    pub fn new(config: SmokerConfig, registry: Arc<PluginRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            state: SmokerState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> SmokerState {
        self.state
    }

    fn transition(&mut self, next: SmokerState) -> Result<(), MachineError> {
        if !self.state.can_transition(next) {
            return Err(MachineError::new(
                "smoker",
                format!("illegal transition {} -> {}", self.state, next),
            ));
        }
        tracing::debug!("smoker: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Run a smoke test over `workspaces`.
    ///
    /// Load-phase faults return an error before anything runs. After that,
    /// failures are data in the returned results; only a machine fault is
    /// returned as an error once reporters have seen `smoke-error`.
    pub async fn run(
        mut self,
        workspaces: Vec<WorkspaceInfo>,
        cancel: CancellationToken,
    ) -> Result<SmokeResults, SmokerError> {
        self.transition(SmokerState::LoadingPlugins)?;
        let executor = self.select_executor()?;
        let reporters = self.select_reporters()?;
        let plan = Arc::new(self.plan()?);

        self.transition(SmokerState::LoadingPkgManagers)?;
        let resolved = match resolve_pkg_managers(
            &self.config.pkg_managers,
            &self.registry,
            &executor,
            &cancel,
        )
        .await
        {
            Err(SmokerError::Aborted) => {
                self.transition(SmokerState::Aborted)?;
                return Err(SmokerError::Aborted);
            }
            other => other?,
        };

        let workspaces: Vec<Arc<WorkspaceInfo>> = workspaces.into_iter().map(Arc::new).collect();
        let (assignments, unsupported) =
            partition(&workspaces, resolved, self.config.allow_private);
        let assignments: Vec<Assignment> = assignments
            .into_iter()
            .filter(|a| !a.workspaces.is_empty())
            .collect();
        if assignments.is_empty() && unsupported.is_empty() {
            return Err(SmokerError::NoWorkspaces);
        }
        if assignments.is_empty() {
            tracing::warn!(
                "No workspace is supported by the requested package managers; nothing will be smoked"
            );
        }

        // Reporters listen before any work begins
        let (bus, reporter_handles) = self.start_reporters(reporters);
        bus.emit(SmokerEvent::SmokeBegin {
            pkg_managers: assignments.iter().map(|a| a.resolved.spec.label()).collect(),
            workspaces: dedup_names(&assignments),
            rules: plan.rules.iter().map(|(rule, _)| rule.id.clone()).collect(),
            scripts: plan.scripts.clone(),
        });

        self.transition(SmokerState::SpawningPkgManagers)?;
        let run_cancel = cancel.child_token();
        let handles: Vec<(usize, Arc<PkgManagerSpec>, JoinHandle<_>)> = assignments
            .into_iter()
            .enumerate()
            .map(|(index, assignment)| {
                let spec = Arc::clone(&assignment.resolved.spec);
                let actor = PkgManagerActor::new(
                    Arc::clone(&spec),
                    assignment.resolved.backend,
                    assignment.workspaces,
                    Arc::clone(&plan),
                    Arc::clone(&executor),
                    bus.sender(),
                    run_cancel.child_token(),
                );
                (index, spec, tokio::spawn(actor.run()))
            })
            .collect();

        self.transition(SmokerState::AwaitingResults)?;
        let collected = self.await_actors(handles, &run_cancel).await;
        let aborted = cancel.is_cancelled();

        if let Some(machine) = collected.machine {
            bus.emit(SmokerEvent::SmokeError {
                error: machine.to_string(),
            });
            self.finish_reporters(bus, reporter_handles).await;
            self.state = SmokerState::Errored;
            return Err(SmokerError::Machine(machine));
        }

        self.transition(SmokerState::Reporting)?;
        let mut results = SmokeResults::aggregate(collected.outcomes, unsupported, aborted);

        let lingered: Vec<_> = results
            .pkg_managers
            .iter()
            .filter_map(|pm| pm.lingered.clone())
            .collect();
        if !lingered.is_empty() {
            bus.emit(SmokerEvent::Lingered {
                directories: lingered,
            });
        }

        let terminal = Box::new(results.clone());
        bus.emit(if aborted {
            SmokerEvent::SmokeAborted { results: terminal }
        } else if results.success {
            SmokerEvent::SmokeOk { results: terminal }
        } else {
            SmokerEvent::SmokeFailed { results: terminal }
        });
        results.reporter_errors = self.finish_reporters(bus, reporter_handles).await;

        self.transition(if aborted {
            SmokerState::Aborted
        } else {
            SmokerState::Done
        })?;
        Ok(results)
    }

    fn select_executor(&self) -> Result<Arc<dyn Executor>, SmokerError> {
        let executor = self
            .registry
            .executor(&self.config.executor)
            .ok_or_else(|| SmokerError::ExecutorNotFound(self.config.executor.clone()))?;
        Ok(Arc::clone(&executor.payload))
    }

    fn select_reporters(&self) -> Result<Vec<Component<dyn Reporter>>, SmokerError> {
        let mut selected = Vec::new();
        for id in &self.config.reporters {
            let reporter = self
                .registry
                .reporter(id)
                .ok_or_else(|| SmokerError::ReporterNotFound(id.clone()))?;
            if reporter.payload.enabled(&self.config) {
                selected.push(reporter.clone());
            } else {
                tracing::debug!("Reporter {} disabled for this run", id);
            }
        }
        Ok(selected)
    }

    fn plan(&self) -> Result<RunPlan, SmokerError> {
        let configs = resolve_rule_configs(&self.registry, &self.config.rules)?;
        let rules = if self.config.lint {
            self.registry
                .rules()
                .iter()
                .filter_map(|rule| {
                    let config = configs.get(&rule.id)?;
                    config.is_enabled().then(|| (rule.clone(), config.clone()))
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(RunPlan::new(&self.config, rules))
    }

    fn start_reporters(
        &self,
        reporters: Vec<Component<dyn Reporter>>,
    ) -> (EventBus, Vec<(String, JoinHandle<Vec<ReporterError>>)>) {
        let mut queues = Vec::with_capacity(reporters.len());
        let mut handles = Vec::with_capacity(reporters.len());
        for reporter in reporters {
            let (actor, queue) = ReporterActor::new(reporter, Arc::clone(&self.config));
            let id = actor.id().to_string();
            queues.push((id.clone(), queue));
            handles.push((id, actor.spawn()));
        }
        (EventBus::start(queues), handles)
    }

    /// Flush the bus and wait for reporters to tear down
    async fn finish_reporters(
        &self,
        bus: EventBus,
        handles: Vec<(String, JoinHandle<Vec<ReporterError>>)>,
    ) -> Vec<ReporterError> {
        bus.finish().await;

        let grace = self.config.grace_period();
        let mut errors = Vec::new();
        for (id, handle) in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(reporter_errors)) => errors.extend(reporter_errors),
                Ok(Err(e)) => errors.push(ReporterError {
                    reporter: id,
                    hook: "actor".to_string(),
                    message: e.to_string(),
                }),
                Err(_) => {
                    abort.abort();
                    tracing::warn!("Reporter {} did not finish in time", id);
                    errors.push(ReporterError {
                        reporter: id,
                        hook: "teardown".to_string(),
                        message: "timed out".to_string(),
                    });
                }
            }
        }
        errors
    }

    /// Wait for every package manager actor.
    ///
    /// Once the run is cancelled, actors get the grace period to finish
    /// before they are aborted.
    async fn await_actors(
        &self,
        handles: Vec<(
            usize,
            Arc<PkgManagerSpec>,
            JoinHandle<Result<PkgManagerOutcome, MachineError>>,
        )>,
        run_cancel: &CancellationToken,
    ) -> Collected {
        let aborts: Vec<_> = handles.iter().map(|(_, _, h)| h.abort_handle()).collect();
        let mut running: FuturesUnordered<_> = handles
            .into_iter()
            .map(|(index, spec, handle)| async move { (index, spec, handle.await) })
            .collect();

        let grace = self.config.grace_period();
        let mut wait = Wait::Running;
        let mut outcomes = Vec::new();
        let mut machine = None;

        loop {
            let deadline = match wait {
                Wait::Grace(deadline) => Some(deadline),
                _ => None,
            };
            let grace_elapsed = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                next = running.next() => {
                    let Some((index, spec, joined)) = next else {
                        break;
                    };
                    match joined {
                        Ok(Ok(outcome)) => outcomes.push((index, outcome)),
                        Ok(Err(e)) => {
                            tracing::error!("{}", e);
                            machine.get_or_insert(e);
                            run_cancel.cancel();
                        }
                        Err(e) if e.is_panic() => {
                            let message = panic_message(&*e.into_panic());
                            let e = MachineError::new(
                                format!("package manager {}", spec.label()),
                                format!("panicked: {message}"),
                            );
                            tracing::error!("{}", e);
                            machine.get_or_insert(e);
                            run_cancel.cancel();
                        }
                        Err(_) => {
                            let mut outcome = PkgManagerOutcome::new((*spec).clone());
                            outcome.aborted = true;
                            outcomes.push((index, outcome));
                        }
                    }
                }
                _ = run_cancel.cancelled(), if matches!(wait, Wait::Running) => {
                    tracing::info!("Cancelling package managers");
                    wait = Wait::Grace(Instant::now() + grace);
                }
                _ = grace_elapsed, if deadline.is_some() => {
                    tracing::warn!("Grace period elapsed; aborting remaining package managers");
                    for abort in &aborts {
                        abort.abort();
                    }
                    wait = Wait::Forced;
                }
            }
        }

        outcomes.sort_by_key(|(index, _)| *index);
        Collected {
            outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
            machine,
        }
    }
}

/// Names of all assigned workspaces, in first-seen order
fn dedup_names(assignments: &[Assignment]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for ws in assignments.iter().flat_map(|a| a.workspaces.iter()) {
        if !names.iter().any(|n| n == ws.name()) {
            names.push(ws.name().to_string());
        }
    }
    names
}
