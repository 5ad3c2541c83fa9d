//! Builtin rules.

use crate::plugin::{Rule, RuleContext};
use anyhow::Context;
use async_trait::async_trait;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File names that should never be published
const BANNED_FILES: &[&str] = &[
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    ".npmrc",
    ".env",
    ".git-credentials",
    ".netrc",
    ".pgpass",
    ".htpasswd",
    ".bash_history",
    "*.keystore",
];

/// Directory names never descended into
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BannedFilesOptions {
    /// Names or globs removed from the banned list
    allow: Vec<String>,
    /// Names or globs added to the banned list
    deny: Vec<String>,
}

impl BannedFilesOptions {
    fn patterns(&self) -> anyhow::Result<Vec<Pattern>> {
        BANNED_FILES
            .iter()
            .copied()
            .chain(self.deny.iter().map(String::as_str))
            .filter(|name| !self.allow.iter().any(|allowed| allowed == name))
            .map(|name| Pattern::new(name).with_context(|| format!("bad pattern {name:?}")))
            .collect()
    }
}

/// Walk `root` and return the relative paths of every file
fn list_files(root: &Path) -> walkdir::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && SKIPPED_DIRS.iter().any(|name| e.file_name() == *name))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Flags credentials and other sensitive files in the published package
#[derive(Debug, Clone, Default)]
pub struct NoBannedFiles;

#[async_trait]
impl Rule for NoBannedFiles {
    fn name(&self) -> &str {
        "no-banned-files"
    }

    fn description(&self) -> &str {
        "Ensures sensitive files are not published"
    }

    fn validate_options(&self, options: Option<&Value>) -> Result<Value, String> {
        let parsed: BannedFilesOptions = match options {
            None => BannedFilesOptions::default(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
        };
        parsed.patterns().map_err(|e| format!("{e:#}"))?;
        serde_json::to_value(parsed).map_err(|e| e.to_string())
    }

    async fn check(&self, ctx: &RuleContext, options: &Value) -> anyhow::Result<()> {
        let options: BannedFilesOptions =
            serde_json::from_value(options.clone()).context("invalid options")?;
        let patterns = options.patterns()?;

        let root = ctx.install_path().to_path_buf();
        let files = tokio::task::spawn_blocking(move || list_files(&root))
            .await
            .context("file walk panicked")?
            .with_context(|| format!("reading {}", ctx.install_path().display()))?;

        for file in files {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if patterns.iter().any(|p| p.matches(name)) {
                let path = file.to_string_lossy();
                ctx.add_issue(
                    format!("Banned file found: {path}"),
                    Some(json!({ "path": path })),
                );
            }
        }
        Ok(())
    }
}

/// Node's resolution candidates for a `main` entry
fn entry_candidates(root: &Path, main: &str) -> [PathBuf; 4] {
    let main = main.trim_start_matches("./");
    [
        root.join(main),
        root.join(format!("{main}.js")),
        root.join(format!("{main}.json")),
        root.join(main).join("index.js"),
    ]
}

/// Verifies the `main` entry point was published
#[derive(Debug, Clone, Default)]
pub struct NoMissingEntryPoint;

#[async_trait]
impl Rule for NoMissingEntryPoint {
    fn name(&self) -> &str {
        "no-missing-entry-point"
    }

    fn description(&self) -> &str {
        "Checks that the package's entry point exists"
    }

    async fn check(&self, ctx: &RuleContext, _options: &Value) -> anyhow::Result<()> {
        let Some(main) = ctx.manifest().main.as_deref() else {
            return Ok(());
        };
        for candidate in entry_candidates(ctx.install_path(), main) {
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(());
            }
        }
        ctx.add_issue(
            format!("Entry point {main} not found"),
            Some(json!({ "main": main })),
        );
        Ok(())
    }
}
