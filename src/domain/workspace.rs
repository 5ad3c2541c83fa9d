//! Workspace entity: one package discovered under the run's root.

use crate::error::{WorkspaceError, WorkspaceResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Version reported for packages whose manifest omits one
const DEFAULT_VERSION: &str = "0.0.0";

/// The subset of `package.json` smoker cares about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub main: Option<String>,
    /// `packageManager` declaration, e.g. `npm@9.8.1`
    #[serde(default)]
    pub package_manager: Option<String>,
    #[serde(default)]
    pub workspaces: Option<WorkspacesField>,
}

/// The two shapes of the `workspaces` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    Patterns(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl PackageJson {
    /// Parse a manifest from raw JSON text
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Workspace glob patterns declared by this manifest
    pub fn workspace_patterns(&self) -> &[String] {
        match &self.workspaces {
            Some(WorkspacesField::Patterns(patterns)) => patterns,
            Some(WorkspacesField::Object { packages }) => packages,
            None => &[],
        }
    }

    /// `name@version`, falling back to placeholders for incomplete manifests
    pub fn package_id(&self) -> String {
        format!(
            "{}@{}",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.version.as_deref().unwrap_or(DEFAULT_VERSION)
        )
    }

    /// Check whether the manifest defines a script
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts.contains_key(script)
    }
}

/// A discovered project unit
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceInfo {
    /// Directory containing the manifest
    pub path: PathBuf,
    /// Parsed manifest
    pub manifest: PackageJson,
    /// Manifest text as read from disk
    #[serde(skip)]
    pub raw_manifest: String,
    /// Is this the monorepo root?
    pub is_root: bool,
}

impl WorkspaceInfo {
    /// Create a workspace from its directory and raw manifest text
    pub fn new(path: PathBuf, raw_manifest: String, is_root: bool) -> WorkspaceResult<Self> {
        let manifest =
            PackageJson::parse(&raw_manifest).map_err(|e| WorkspaceError::InvalidManifest {
                path: path.join("package.json"),
                message: e.to_string(),
            })?;

        if manifest.name.as_deref().map_or(true, str::is_empty) {
            return Err(WorkspaceError::InvalidManifest {
                path: path.join("package.json"),
                message: "missing \"name\" field".to_string(),
            });
        }

        Ok(Self {
            path,
            manifest,
            raw_manifest,
            is_root,
        })
    }

    /// Package name
    pub fn name(&self) -> &str {
        self.manifest.name.as_deref().unwrap_or_default()
    }

    /// Package version
    pub fn version(&self) -> &str {
        self.manifest.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    /// `name@version`
    pub fn package_id(&self) -> String {
        format!("{}@{}", self.name(), self.version())
    }

    /// Is the package marked private?
    pub fn is_private(&self) -> bool {
        self.manifest.private
    }

    /// The package manager binary this workspace declares, if any
    pub fn declared_pkg_manager(&self) -> Option<&str> {
        let declared = self.manifest.package_manager.as_deref()?;
        let bin = declared.split('@').next().unwrap_or(declared).trim();
        if bin.is_empty() {
            None
        } else {
            Some(bin)
        }
    }

    /// Path of the manifest file
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join("package.json")
    }
}
