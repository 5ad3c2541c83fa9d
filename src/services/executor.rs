//! Process execution for package manager commands.
//!
//! The [`Executor`] trait is the subprocess boundary: backends never spawn
//! processes directly. [`SystemExecutor`] is the default implementation.

use crate::domain::{ExecOutput, PkgManagerSpec};
use crate::error::ExecError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Options for one executor invocation
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Abort the process when this token is cancelled
    pub cancel: Option<CancellationToken>,
}

impl ExecOptions {
    /// Options running in the given directory
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }

    /// Attach a cancellation token
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Runs package manager commands.
///
/// A non-zero exit code is returned as part of the [`ExecOutput`], never as
/// an error.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `spec`'s binary with `args`
    async fn exec(
        &self,
        spec: &PkgManagerSpec,
        args: &[String],
        options: ExecOptions,
    ) -> Result<ExecOutput, ExecError>;
}

/// Executor spawning real processes with tokio
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    /// Create a new system executor
    pub fn new() -> Self {
        Self
    }

    /// Program and leading arguments for a spec.
    ///
    /// System specs run the binary on `PATH`; pinned versions go through
    /// `npx` so the requested version is fetched on demand.
    fn program(spec: &PkgManagerSpec) -> (String, Vec<String>) {
        if spec.system {
            (spec.bin.clone(), Vec::new())
        } else {
            (
                "npx".to_string(),
                vec![
                    "--yes".to_string(),
                    format!("{}@{}", spec.bin, spec.version),
                ],
            )
        }
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn exec(
        &self,
        spec: &PkgManagerSpec,
        args: &[String],
        options: ExecOptions,
    ) -> Result<ExecOutput, ExecError> {
        let (program, mut full_args) = Self::program(spec);
        full_args.extend(args.iter().cloned());
        let command_line = format!("{} {}", program, full_args.join(" "));

        let mut command = Command::new(&program);
        command
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }

        tracing::debug!("Spawning {}", command_line);
        let start = Instant::now();
        let child = command.spawn().map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        // Dropping the `wait_with_output` future kills the child.
        let output = match options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("Aborting {}", command_line);
                        return Err(ExecError::Aborted { command: command_line });
                    }
                    res = child.wait_with_output() => res,
                }
            }
            None => child.wait_with_output().await,
        }
        .map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        Ok(ExecOutput::new(
            command_line,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
            start.elapsed(),
        ))
    }
}
