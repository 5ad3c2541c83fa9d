//! Configuration management for smoker.
//!
//! Supports layered configuration: defaults → project → user → env

use crate::domain::RawRuleSetting;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project configuration file name
const PROJECT_CONFIG_FILE: &str = ".smoker.toml";

/// Keys parsed as comma-separated lists from the environment
const LIST_KEYS: &[&str] = &["pkg_managers", "scripts", "reporters", "add", "workspaces"];

/// Options for a smoke run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokerConfig {
    /// Package manager requests, e.g. `npm` or `npm@9`
    #[serde(default = "default_pkg_managers")]
    pub pkg_managers: Vec<String>,
    /// Scripts to run in each installed package
    #[serde(default)]
    pub scripts: Vec<String>,
    /// Run rules against installed packages
    #[serde(default = "default_lint")]
    pub lint: bool,
    /// Rule settings keyed by rule id
    #[serde(default)]
    pub rules: BTreeMap<String, RawRuleSetting>,
    /// Reporter ids to enable
    #[serde(default = "default_reporters")]
    pub reporters: Vec<String>,
    /// Executor id
    #[serde(default = "default_executor")]
    pub executor: String,
    /// Additional dependencies installed next to each artifact
    #[serde(default)]
    pub add: Vec<String>,
    /// Smoke every declared workspace
    #[serde(default)]
    pub all: bool,
    /// Smoke only these workspaces (by name or path)
    #[serde(default)]
    pub workspaces: Vec<String>,
    /// Include the root package alongside its workspaces
    #[serde(default)]
    pub include_root: bool,
    /// Smoke packages marked private
    #[serde(default)]
    pub allow_private: bool,
    /// Stop running scripts after the first failure
    #[serde(default)]
    pub bail: bool,
    /// Skip scripts a package does not define
    #[serde(default)]
    pub loose: bool,
    /// Keep temporary directories
    #[serde(default)]
    pub linger: bool,
    /// Emit machine-readable results
    #[serde(default)]
    pub json: bool,
    /// Verbose output
    #[serde(default)]
    pub verbose: bool,
    /// Fan-out limit for packs, installs and rules
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How long to wait for actors after cancellation
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Parent of per-package-manager temporary directories
    #[serde(default)]
    pub tmp_root: Option<PathBuf>,
}

impl Default for SmokerConfig {
    fn default() -> Self {
        Self {
            pkg_managers: default_pkg_managers(),
            scripts: Vec::new(),
            lint: default_lint(),
            rules: BTreeMap::new(),
            reporters: default_reporters(),
            executor: default_executor(),
            add: Vec::new(),
            all: false,
            workspaces: Vec::new(),
            include_root: false,
            allow_private: false,
            bail: false,
            loose: false,
            linger: false,
            json: false,
            verbose: false,
            concurrency: default_concurrency(),
            grace_period_ms: default_grace_period_ms(),
            tmp_root: None,
        }
    }
}

impl SmokerConfig {
    /// Load configuration with hierarchy: defaults → project → user → env
    pub fn load(project_root: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // 1. Start with defaults
        builder = builder.add_source(
            config::File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            )
            .required(false),
        );

        // 2. Project-specific config (.smoker.toml in project root)
        if let Some(root) = project_root {
            let project_config = root.join(PROJECT_CONFIG_FILE);
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }
        }

        // 3. User config (~/.config/smoker/config.toml)
        if let Some(config_dir) = directories::ProjectDirs::from("com", "smoker", "smoker") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        // 4. Environment variables (SMOKER_*)
        let mut env = Environment::with_prefix("SMOKER")
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }
        builder = builder.add_source(env);

        let config = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration with default settings only
    pub fn load_defaults() -> Self {
        Self::default()
    }

    /// Structural checks the type system cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.pkg_managers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one package manager is required".to_string(),
            ));
        }
        if !self.lint && self.scripts.is_empty() {
            return Err(ConfigError::Invalid(
                "nothing to do: linting is disabled and no scripts were given".to_string(),
            ));
        }
        Ok(())
    }

    /// Grace period for cancellation
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Parent directory for temporary directories
    pub fn tmp_root(&self) -> PathBuf {
        self.tmp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_pkg_managers() -> Vec<String> {
    vec!["npm".to_string()]
}

fn default_lint() -> bool {
    true
}

fn default_reporters() -> Vec<String> {
    vec!["console".to_string(), "json".to_string()]
}

fn default_executor() -> String {
    "system".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_grace_period_ms() -> u64 {
    5000
}
