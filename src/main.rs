//! smoker: smoke-test packages before publishing them
//!
//! Runs in the current directory unless `--cd` is given. Positional
//! arguments name scripts to run in each installed package.

use anyhow::{Context, Result};
use clap::Parser;
use smoker::cli::Cli;
use smoker::domain::SmokeResults;
use smoker::plugin::PluginRegistry;
use smoker::services::loader;
use smoker::{builtin, Smoker, SmokerConfig, SmokerError};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit status for a run that found problems
const EXIT_FAILED: u8 = 1;
/// Exit status for a run that could not complete
const EXIT_FATAL: u8 = 2;
/// Exit status after Ctrl+C
const EXIT_ABORTED: u8 = 130;

/// Initialize logging with RUST_LOG environment variable support
fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn exit_code(results: &SmokeResults) -> ExitCode {
    if results.aborted {
        ExitCode::from(EXIT_ABORTED)
    } else if results.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}

/// Load, discover and run; errors here are fatal
async fn run(cli: Cli) -> Result<ExitCode> {
    let project_root = match cli.cwd.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot read the current directory")?,
    };

    let mut config = SmokerConfig::load(Some(&project_root))?;
    cli.apply(&mut config)?;

    init_logging(config.verbose);
    tracing::info!("Starting smoker in {:?}", project_root);

    let workspaces = loader::discover_workspaces(&project_root, &config).await?;

    let mut registry = PluginRegistry::new();
    builtin::register(&mut registry)?;

    let cancel = CancellationToken::new();
    let smoke = Smoker::new(config, Arc::new(registry)).run(workspaces, cancel.clone());
    tokio::pin!(smoke);

    // Ctrl+C cancels the run; the coordinator still drains and reports
    let outcome = tokio::select! {
        outcome = &mut smoke => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, aborting");
            cancel.cancel();
            smoke.await
        }
    };

    match outcome {
        Ok(results) => Ok(exit_code(&results)),
        Err(SmokerError::Aborted) => Ok(ExitCode::from(EXIT_ABORTED)),
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("smoker: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
