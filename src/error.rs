//! Unified error types for smoker.
//!
//! Errors that travel inside results and events (pack, install, script, rule
//! and reporter failures) are `Clone + Serialize` so reporters can render
//! them. Load-time and machine faults are plain error values.

use crate::domain::ExecOutput;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for a smoke run
#[derive(Debug, Error)]
pub enum SmokerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    UnsupportedPackageManager(#[from] UnsupportedPackageManagerError),

    #[error("Executor not found: {0}")]
    ExecutorNotFound(String),

    #[error("Reporter not found: {0}")]
    ReporterNotFound(String),

    #[error("No package managers could be resolved")]
    NoPackageManagers,

    #[error("No workspaces to smoke")]
    NoWorkspaces,

    #[error("{0}")]
    Machine(#[from] MachineError),

    #[error("Run aborted")]
    Aborted,
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Unknown rule in configuration: {0}")]
    UnknownRule(String),

    #[error("Invalid options for rule {rule}: {message}")]
    InvalidRuleOptions { rule: String, message: String },
}

/// Workspace discovery errors
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("No package.json found in {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid package.json at {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("Invalid workspace pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plugin registration errors.
///
/// Any of these fails the load phase before an actor starts.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin at {entry_point} is already registered as {existing} (attempted as {name})")]
    DuplicatePlugin {
        entry_point: String,
        existing: String,
        name: String,
    },

    #[error("Plugin name {name} is already claimed by {existing_entry_point} (conflicts with {entry_point})")]
    PluginConflict {
        name: String,
        existing_entry_point: String,
        entry_point: String,
    },

    #[error("Failed to import plugin from {entry_point}: {source}")]
    PluginImport {
        entry_point: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to initialize plugin {name}: {source}")]
    PluginInit {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Plugin at {entry_point} has invalid name {name:?}")]
    InvalidPluginName { entry_point: String, name: String },

    #[error("Plugin {plugin} defines more than one {kind} named {name}")]
    ComponentCollision {
        plugin: String,
        kind: String,
        name: String,
    },

    #[error("Plugin {plugin} defines a {kind} with invalid name {name:?}")]
    InvalidComponentName {
        plugin: String,
        kind: String,
        name: String,
    },
}

/// Failure reported by a package manager backend while packing one workspace
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PackError {
    pub message: String,
    pub output: Option<ExecOutput>,
    /// Stop packing the remaining workspaces
    pub fatal: bool,
}

impl PackError {
    /// Create a non-fatal pack error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: None,
            fatal: false,
        }
    }

    /// Attach the raw process output
    pub fn with_output(mut self, output: ExecOutput) -> Self {
        self.output = Some(output);
        self
    }

    /// Mark the error as fatal for the owning package manager
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

/// Domain failures of a package manager actor
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PkgManagerError {
    #[error("{pkg_manager} failed to pack {workspace}: {message}")]
    Pack {
        pkg_manager: String,
        workspace: String,
        message: String,
        output: Option<ExecOutput>,
    },

    #[error("{pkg_manager} failed to install {package}: {message}")]
    Install {
        pkg_manager: String,
        package: String,
        message: String,
        output: Option<ExecOutput>,
    },

    #[error("Script {script} is not defined by {package}")]
    UnknownScript {
        pkg_manager: String,
        package: String,
        script: String,
    },

    #[error("{pkg_manager} could not run script {script} in {package}: {message}")]
    Script {
        pkg_manager: String,
        package: String,
        script: String,
        message: String,
    },

    #[error("{pkg_manager} setup failed: {message}")]
    Setup { pkg_manager: String, message: String },

    #[error("{pkg_manager} teardown failed: {message}")]
    Teardown { pkg_manager: String, message: String },

    #[error("{pkg_manager} could not create a temporary directory: {message}")]
    TempDir { pkg_manager: String, message: String },
}

impl PkgManagerError {
    /// Label of the package manager that produced the error
    pub fn pkg_manager(&self) -> &str {
        match self {
            Self::Pack { pkg_manager, .. }
            | Self::Install { pkg_manager, .. }
            | Self::UnknownScript { pkg_manager, .. }
            | Self::Script { pkg_manager, .. }
            | Self::Setup { pkg_manager, .. }
            | Self::Teardown { pkg_manager, .. }
            | Self::TempDir { pkg_manager, .. } => pkg_manager,
        }
    }
}

/// A workspace (or requested spec) no loaded backend can handle
#[derive(Debug, Clone, Error, Serialize)]
#[error("No package manager supports {requested}{}", .workspace.as_ref().map(|w| format!(" (required by {w})")).unwrap_or_default())]
pub struct UnsupportedPackageManagerError {
    pub requested: String,
    pub workspace: Option<String>,
}

/// A rule's check failed instead of reporting issues
#[derive(Debug, Clone, Error, Serialize)]
#[error("Rule {rule} failed on {package}: {message}")]
pub struct RuleError {
    pub rule: String,
    pub package: String,
    pub pkg_manager: String,
    pub message: String,
}

/// A reporter hook failed
#[derive(Debug, Clone, Error, Serialize)]
#[error("Reporter {reporter} failed in {hook}: {message}")]
pub struct ReporterError {
    pub reporter: String,
    pub hook: String,
    pub message: String,
}

/// Errors at the executor boundary.
///
/// A non-zero exit code is not an error here.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command aborted: {command}")]
    Aborted { command: String },
}

/// A fault in the orchestration itself
#[derive(Debug, Clone, Error)]
#[error("Machine error in {actor}: {message}")]
pub struct MachineError {
    pub actor: String,
    pub message: String,
}

impl MachineError {
    /// Create a machine error for an actor
    pub fn new(actor: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for smoke runs
pub type Result<T> = std::result::Result<T, SmokerError>;

/// Result type alias for plugin registration
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Result type alias for workspace discovery
pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message_includes_workspace() {
        let err = UnsupportedPackageManagerError {
            requested: "pnpm".to_string(),
            workspace: Some("pkg-a".to_string()),
        };
        insta::assert_snapshot!(err.to_string(), @"No package manager supports pnpm (required by pkg-a)");

        let err = UnsupportedPackageManagerError {
            requested: "bun@1".to_string(),
            workspace: None,
        };
        assert_eq!(err.to_string(), "No package manager supports bun@1");
    }

    #[test]
    fn test_pkg_manager_error_serializes_kind() {
        let err = PkgManagerError::UnknownScript {
            pkg_manager: "npm@9.0.0".to_string(),
            package: "pkg-a@1.0.0".to_string(),
            script: "smoke".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "unknown-script");
        assert_eq!(err.pkg_manager(), "npm@9.0.0");
    }

    #[test]
    fn test_pack_error_builders() {
        let err = PackError::new("boom").fatal();
        assert!(err.fatal);
        assert!(err.output.is_none());
        assert_eq!(err.to_string(), "boom");
    }
}
