//! Command-line arguments.
//!
//! Flags override the layered file and environment configuration.

use crate::config::SmokerConfig;
use crate::error::ConfigError;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    name = "smoker",
    version,
    about = "Smoke-test packages by packing, installing and linting them",
    after_help = "Examples:\n  smoker\n  smoker test --pm npm@9 --pm npm@10\n  smoker --all --json"
)]
pub struct Cli {
    /// Scripts to run in each installed package
    #[arg(value_name = "SCRIPT")]
    pub scripts: Vec<String>,

    /// Package manager to smoke with, e.g. `npm` or `npm@9` (repeatable)
    #[arg(long = "pm", short = 'p', value_name = "SPEC")]
    pub pkg_managers: Vec<String>,

    /// Smoke every declared workspace
    #[arg(long, short = 'a', default_value_t = false)]
    pub all: bool,

    /// Smoke only this workspace, by name or path (repeatable)
    #[arg(long = "workspace", short = 'w', value_name = "NAME")]
    pub workspaces: Vec<String>,

    /// Include the root package alongside its workspaces
    #[arg(long, default_value_t = false)]
    pub include_root: bool,

    /// Smoke packages marked private
    #[arg(long, default_value_t = false)]
    pub allow_private: bool,

    /// Additional dependency installed next to each package (repeatable)
    #[arg(long, value_name = "DEP")]
    pub add: Vec<String>,

    /// Skip linting
    #[arg(long = "no-lint", action = ArgAction::SetTrue)]
    pub no_lint: bool,

    /// Stop running scripts after the first failure
    #[arg(long, default_value_t = false)]
    pub bail: bool,

    /// Skip scripts a package does not define
    #[arg(long, default_value_t = false)]
    pub loose: bool,

    /// Keep temporary directories
    #[arg(long, default_value_t = false)]
    pub linger: bool,

    /// Reporter id to enable (repeatable; replaces the configured list)
    #[arg(long = "reporter", short = 'r', value_name = "ID")]
    pub reporters: Vec<String>,

    /// Executor id
    #[arg(long, value_name = "ID")]
    pub executor: Option<String>,

    /// Fan-out limit for packs, installs and rules
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Emit machine-readable results
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Verbose output
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// Run as if started in this directory
    #[arg(long = "cd", short = 'C', value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}

impl Cli {
    /// Merge flags over a loaded configuration and re-validate it
    pub fn apply(self, config: &mut SmokerConfig) -> Result<(), ConfigError> {
        if !self.scripts.is_empty() {
            config.scripts = self.scripts;
        }
        if !self.pkg_managers.is_empty() {
            config.pkg_managers = self.pkg_managers;
        }
        if !self.workspaces.is_empty() {
            config.workspaces = self.workspaces;
        }
        if !self.reporters.is_empty() {
            config.reporters = self.reporters;
        }
        config.add.extend(self.add);
        if let Some(executor) = self.executor {
            config.executor = executor;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        config.all |= self.all;
        config.include_root |= self.include_root;
        config.allow_private |= self.allow_private;
        config.bail |= self.bail;
        config.loose |= self.loose;
        config.linger |= self.linger;
        config.json |= self.json;
        config.verbose |= self.verbose;
        if self.no_lint {
            config.lint = false;
        }

        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_not_scripts() {
        let cli = Cli::try_parse_from(["smoker", "--json", "smoke", "-p", "npm@9", "--pm", "npm@10"])
            .unwrap();
        assert_eq!(cli.scripts, vec!["smoke"]);
        assert!(cli.json);

        let mut config = SmokerConfig::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.scripts, vec!["smoke"]);
        assert_eq!(config.pkg_managers, vec!["npm@9", "npm@10"]);
        assert!(config.json);
        assert!(config.lint);
    }

    #[test]
    fn test_help_is_not_a_run() {
        let err = Cli::try_parse_from(["smoker", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        let err = Cli::try_parse_from(["smoker", "--no-such-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_empty_flags_keep_file_config() {
        let mut config = SmokerConfig {
            scripts: vec!["from-file".to_string()],
            bail: true,
            add: vec!["left-pad".to_string()],
            ..SmokerConfig::default()
        };
        Cli::try_parse_from(["smoker", "--add", "is-odd"])
            .unwrap()
            .apply(&mut config)
            .unwrap();
        assert_eq!(config.scripts, vec!["from-file"]);
        assert!(config.bail);
        assert_eq!(config.add, vec!["left-pad", "is-odd"]);
    }

    #[test]
    fn test_no_lint_without_scripts_is_invalid() {
        let mut config = SmokerConfig::default();
        let err = Cli::try_parse_from(["smoker", "--no-lint"])
            .unwrap()
            .apply(&mut config)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = SmokerConfig::default();
        Cli::try_parse_from(["smoker", "--no-lint", "--all", "-w", "pkg-a", "test"])
            .unwrap()
            .apply(&mut config)
            .unwrap();
        assert!(!config.lint);
        assert!(config.all);
        assert_eq!(config.workspaces, vec!["pkg-a"]);
    }
}
