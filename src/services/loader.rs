//! One-shot loaders used before and during a run.
//!
//! - Workspace discovery from a root `package.json`
//! - Manifest reads
//! - Per-actor temporary directories
//! - Resolving package manager requests to backends

use crate::config::SmokerConfig;
use crate::domain::{PackageJson, PkgManagerRequest, PkgManagerSpec, WorkspaceInfo};
use crate::error::{SmokerError, UnsupportedPackageManagerError, WorkspaceError, WorkspaceResult};
use crate::plugin::{Component, PackageManager, PluginRegistry};
use crate::services::{ExecOptions, Executor, OrCancelExt};
use semver::Version;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Manifest file name
pub const MANIFEST_FILE: &str = "package.json";

/// Read and parse the `package.json` in `dir`.
///
/// Returns the parsed manifest with its raw text.
pub async fn read_package_json(dir: &Path) -> WorkspaceResult<(PackageJson, String)> {
    let path = dir.join(MANIFEST_FILE);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorkspaceError::ManifestNotFound(dir.to_path_buf()));
        }
        Err(e) => return Err(WorkspaceError::Io(e)),
    };
    let manifest =
        PackageJson::parse(&raw).map_err(|e| WorkspaceError::InvalidManifest {
            path,
            message: e.to_string(),
        })?;
    Ok((manifest, raw))
}

/// Read a workspace from its directory
pub async fn read_workspace(dir: &Path, is_root: bool) -> WorkspaceResult<WorkspaceInfo> {
    let (_, raw) = read_package_json(dir).await?;
    WorkspaceInfo::new(dir.to_path_buf(), raw, is_root)
}

/// Discover the workspaces to smoke under `root`.
///
/// Without `all` or named `workspaces` only the root package is smoked.
/// Selection by name matches either the package name or its path relative
/// to the root.
pub async fn discover_workspaces(
    root: &Path,
    config: &SmokerConfig,
) -> WorkspaceResult<Vec<WorkspaceInfo>> {
    let (root_manifest, root_raw) = read_package_json(root).await?;
    let patterns = root_manifest.workspace_patterns().to_vec();

    if !config.all && config.workspaces.is_empty() {
        let root_ws = WorkspaceInfo::new(root.to_path_buf(), root_raw, true)?;
        return Ok(vec![root_ws]);
    }

    let dirs = expand_patterns(root, &patterns).await?;
    let mut found = Vec::with_capacity(dirs.len());
    for dir in dirs {
        match read_workspace(&dir, false).await {
            Ok(ws) => found.push(ws),
            Err(WorkspaceError::ManifestNotFound(dir)) => {
                tracing::debug!("Skipping {:?}: no {}", dir, MANIFEST_FILE);
            }
            Err(e) => return Err(e),
        }
    }

    let mut selected = if config.all {
        found
    } else {
        select_named(root, found, &config.workspaces)?
    };

    if config.include_root {
        let root_ws = WorkspaceInfo::new(root.to_path_buf(), root_raw, true)?;
        selected.insert(0, root_ws);
    }

    if selected.is_empty() {
        tracing::warn!("No workspaces matched under {:?}", root);
    }
    Ok(selected)
}

/// Expand workspace globs into package directories, sorted and de-duplicated
async fn expand_patterns(root: &Path, patterns: &[String]) -> WorkspaceResult<Vec<PathBuf>> {
    let root = root.to_path_buf();
    let patterns = patterns.to_vec();
    tokio::task::spawn_blocking(move || {
        let mut dirs = Vec::new();
        let mut seen = HashSet::new();
        for pattern in &patterns {
            let full = root.join(pattern);
            let entries =
                glob::glob(&full.to_string_lossy()).map_err(|e| WorkspaceError::Pattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            for entry in entries {
                let path = entry.map_err(|e| WorkspaceError::Io(e.into_error()))?;
                if path.is_dir() && seen.insert(path.clone()) {
                    dirs.push(path);
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    })
    .await
    .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))?
}

/// Keep workspaces matching the requested names or relative paths
fn select_named(
    root: &Path,
    found: Vec<WorkspaceInfo>,
    wanted: &[String],
) -> WorkspaceResult<Vec<WorkspaceInfo>> {
    let matches = |ws: &WorkspaceInfo, want: &str| {
        let relative = ws.path.strip_prefix(root).unwrap_or(&ws.path);
        ws.name() == want || relative == Path::new(want.trim_start_matches("./"))
    };

    if let Some(missing) = wanted
        .iter()
        .find(|want| !found.iter().any(|ws| matches(ws, want.as_str())))
    {
        return Err(WorkspaceError::NotFound(missing.clone()));
    }

    Ok(found
        .into_iter()
        .filter(|ws| wanted.iter().any(|want| matches(ws, want.as_str())))
        .collect())
}

/// Create a private temporary directory for a package manager actor.
///
/// The directory name starts with the spec's `<bin>-<version>` key.
pub async fn create_temp_dir(parent: &Path, spec: &PkgManagerSpec) -> std::io::Result<TempDir> {
    let parent = parent.to_path_buf();
    let prefix = format!("{}-", spec.tmp_key());
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&parent)?;
        tempfile::Builder::new().prefix(&prefix).tempdir_in(&parent)
    })
    .await
    .map_err(std::io::Error::other)?
}

/// A package manager request matched to a backend
#[derive(Debug, Clone)]
pub struct ResolvedPkgManager {
    pub spec: Arc<PkgManagerSpec>,
    pub backend: Component<dyn PackageManager>,
}

/// Resolve each request to a spec and the first backend accepting it.
///
/// Requests without a concrete version probe the system binary with
/// `--version`. Identical specs are resolved once.
pub async fn resolve_pkg_managers(
    requests: &[String],
    registry: &PluginRegistry,
    executor: &Arc<dyn Executor>,
    cancel: &CancellationToken,
) -> Result<Vec<ResolvedPkgManager>, SmokerError> {
    let mut resolved: Vec<ResolvedPkgManager> = Vec::new();

    for raw in requests {
        let unsupported = || UnsupportedPackageManagerError {
            requested: raw.clone(),
            workspace: None,
        };
        let request = PkgManagerRequest::parse(raw).ok_or_else(unsupported)?;

        let candidates: Vec<_> = registry
            .pkg_managers()
            .iter()
            .filter(|c| c.payload.bin() == request.bin)
            .collect();
        if candidates.is_empty() {
            return Err(unsupported().into());
        }

        let (version, system) = if request.wants_system() {
            let version = probe_system_version(&request.bin, executor, cancel)
                .await?
                .ok_or_else(unsupported)?;
            (version, true)
        } else {
            (request.coerced_version().ok_or_else(unsupported)?, false)
        };

        let backend = candidates
            .into_iter()
            .find(|c| c.payload.accepts(&version))
            .ok_or_else(unsupported)?;
        let spec = PkgManagerSpec::new(request.bin.clone(), version, system);

        if resolved.iter().any(|r| *r.spec == spec) {
            tracing::debug!("Ignoring duplicate package manager request {}", raw);
            continue;
        }
        tracing::info!("Resolved {} to {} via {}", raw, spec, backend.id);
        resolved.push(ResolvedPkgManager {
            spec: Arc::new(spec),
            backend: backend.clone(),
        });
    }

    if resolved.is_empty() {
        return Err(SmokerError::NoPackageManagers);
    }
    Ok(resolved)
}

/// Ask the system installation of `bin` for its version
async fn probe_system_version(
    bin: &str,
    executor: &Arc<dyn Executor>,
    cancel: &CancellationToken,
) -> Result<Option<Version>, SmokerError> {
    let probe = PkgManagerSpec::new(bin, Version::new(0, 0, 0), true);
    let args = ["--version".to_string()];
    let options = ExecOptions::default().with_cancel(cancel.clone());

    let output = match executor
        .exec(&probe, &args, options)
        .or_cancel(cancel)
        .await
        .map_err(|_| SmokerError::Aborted)?
    {
        Ok(output) if output.succeeded() => output,
        Ok(output) => {
            tracing::warn!("{} --version exited with {}", bin, output.exit_code);
            return Ok(None);
        }
        Err(crate::error::ExecError::Aborted { .. }) => return Err(SmokerError::Aborted),
        Err(e) => {
            tracing::warn!("Could not probe {}: {}", bin, e);
            return Ok(None);
        }
    };

    let raw = output.stdout.trim().trim_start_matches('v');
    Ok(Version::parse(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginModule;
    use crate::testing::{FakeExecutor, FakePackageManager};
    use std::fs;

    fn write_pkg(dir: &Path, json: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), json).unwrap();
    }

    fn monorepo() -> TempDir {
        let temp = TempDir::new().unwrap();
        write_pkg(
            temp.path(),
            r#"{"name":"root","private":true,"workspaces":["packages/*"]}"#,
        );
        write_pkg(
            &temp.path().join("packages/a"),
            r#"{"name":"pkg-a","version":"1.0.0"}"#,
        );
        write_pkg(
            &temp.path().join("packages/b"),
            r#"{"name":"pkg-b","version":"2.0.0","packageManager":"yarn@4.0.0"}"#,
        );
        fs::create_dir_all(temp.path().join("packages/not-a-package")).unwrap();
        temp
    }

    #[tokio::test]
    async fn test_default_discovers_root_only() {
        let temp = monorepo();
        let config = SmokerConfig::default();
        let found = discover_workspaces(temp.path(), &config).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_root);
        assert_eq!(found[0].name(), "root");
    }

    #[tokio::test]
    async fn test_all_expands_patterns() {
        let temp = monorepo();
        let config = SmokerConfig {
            all: true,
            ..SmokerConfig::default()
        };
        let found = discover_workspaces(temp.path(), &config).await.unwrap();
        let names: Vec<_> = found.iter().map(|w| w.name()).collect();
        assert_eq!(names, vec!["pkg-a", "pkg-b"]);

        let config = SmokerConfig {
            all: true,
            include_root: true,
            ..SmokerConfig::default()
        };
        let found = discover_workspaces(temp.path(), &config).await.unwrap();
        assert_eq!(found.len(), 3);
        assert!(found[0].is_root);
    }

    #[tokio::test]
    async fn test_select_by_name_or_path() {
        let temp = monorepo();
        let config = SmokerConfig {
            workspaces: vec!["pkg-a".to_string(), "packages/b".to_string()],
            ..SmokerConfig::default()
        };
        let found = discover_workspaces(temp.path(), &config).await.unwrap();
        assert_eq!(found.len(), 2);

        let config = SmokerConfig {
            workspaces: vec!["nope".to_string()],
            ..SmokerConfig::default()
        };
        let err = discover_workspaces(temp.path(), &config).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(ref name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_missing_root_manifest() {
        let temp = TempDir::new().unwrap();
        let err = read_package_json(temp.path()).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::ManifestNotFound(_)));

        fs::write(temp.path().join(MANIFEST_FILE), "{ not json").unwrap();
        let err = read_package_json(temp.path()).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidManifest { .. }));
    }

    #[tokio::test]
    async fn test_temp_dir_is_keyed_by_spec() {
        let temp = TempDir::new().unwrap();
        let spec = PkgManagerSpec::new("npm", Version::new(9, 8, 1), false);
        let dir = create_temp_dir(&temp.path().join("nested"), &spec)
            .await
            .unwrap();
        let name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("npm-9.8.1-"));
        assert!(dir.path().is_dir());
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register_module(
                "builtin",
                PluginModule::new(|api| {
                    api.define_package_manager(FakePackageManager::new("npm", ">=7"));
                    Ok(())
                })
                .named("smoker-plugin-default"),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_resolve_pinned_and_system_versions() {
        let registry = registry();
        let executor: Arc<dyn Executor> =
            Arc::new(FakeExecutor::default().respond("--version", 0, "10.2.4\n"));
        let cancel = CancellationToken::new();

        let requests = vec!["npm@9".to_string(), "npm".to_string(), "npm@9.0.0".to_string()];
        let resolved = resolve_pkg_managers(&requests, &registry, &executor, &cancel)
            .await
            .unwrap();

        let labels: Vec<_> = resolved.iter().map(|r| r.spec.label()).collect();
        assert_eq!(labels, vec!["npm@9.0.0", "npm@10.2.4 (system)"]);
        assert_eq!(resolved[0].backend.id, "npm");
    }

    #[tokio::test]
    async fn test_unsupported_requests() {
        let registry = registry();
        let executor: Arc<dyn Executor> = Arc::new(FakeExecutor::default());
        let cancel = CancellationToken::new();

        for request in ["pnpm@8", "npm@6", "npm@next"] {
            let err = resolve_pkg_managers(&[request.to_string()], &registry, &executor, &cancel)
                .await
                .unwrap_err();
            assert!(
                matches!(err, SmokerError::UnsupportedPackageManager(ref e) if e.requested == request),
                "{request}"
            );
        }
    }
}
