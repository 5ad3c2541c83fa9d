//! Package manager specs and the manifests passed between pipeline phases.
//!
//! Each phase produces a new manifest type from the previous one:
//! pack yields [`InstallManifest`]s, install yields [`LintManifest`]s.

use super::{PackageJson, WorkspaceInfo};
use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Version tag meaning "whatever the system has installed"
const SYSTEM_TAG: &str = "latest";

fn request_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<bin>[a-z][a-z0-9._-]*)(?:@(?P<version>[^@\s]+))?$")
            .expect("package manager request pattern is valid")
    })
}

/// A user's package manager request, e.g. `npm` or `npm@9`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PkgManagerRequest {
    pub bin: String,
    pub version: Option<String>,
}

impl PkgManagerRequest {
    /// Parse a request of the form `<bin>[@<version>]`
    pub fn parse(s: &str) -> Option<Self> {
        let caps = request_pattern().captures(s.trim())?;
        Some(Self {
            bin: caps["bin"].to_string(),
            version: caps.name("version").map(|v| v.as_str().to_string()),
        })
    }

    /// Does this request defer to the system installation?
    pub fn wants_system(&self) -> bool {
        self.version.as_deref().map_or(true, |v| v == SYSTEM_TAG)
    }

    /// Coerce the requested version to a full semver version.
    ///
    /// `9` becomes `9.0.0`, `9.1` becomes `9.1.0`. Dist-tags other than
    /// `latest` cannot be coerced.
    pub fn coerced_version(&self) -> Option<Version> {
        let raw = self.version.as_deref()?.trim_start_matches('v');
        if let Ok(version) = Version::parse(raw) {
            return Some(version);
        }
        let parts: Vec<u64> = raw
            .split('.')
            .map(str::parse)
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [major] => Some(Version::new(*major, 0, 0)),
            [major, minor] => Some(Version::new(*major, *minor, 0)),
            _ => None,
        }
    }
}

impl fmt::Display for PkgManagerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.bin, version),
            None => write!(f, "{}", self.bin),
        }
    }
}

/// A resolved package manager backend and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PkgManagerSpec {
    pub bin: String,
    pub version: Version,
    /// Version was probed from the system installation
    pub system: bool,
}

impl PkgManagerSpec {
    /// Create a new spec
    pub fn new(bin: impl Into<String>, version: Version, system: bool) -> Self {
        Self {
            bin: bin.into(),
            version,
            system,
        }
    }

    /// Normalized label, e.g. `npm@9.8.1` or `npm@10.2.0 (system)`
    pub fn label(&self) -> String {
        if self.system {
            format!("{}@{} (system)", self.bin, self.version)
        } else {
            format!("{}@{}", self.bin, self.version)
        }
    }

    /// Key used to name this spec's temporary directory
    pub fn tmp_key(&self) -> String {
        format!("{}-{}", self.bin, self.version)
    }
}

impl fmt::Display for PkgManagerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// What to install and where
#[derive(Debug, Clone, Serialize)]
pub struct InstallManifest {
    /// Tarball path or `name@version`
    pub pkg_spec: String,
    /// Name of the package once installed
    pub pkg_name: String,
    /// Where the package will live after installation
    pub install_path: PathBuf,
    /// Directory the install runs in
    pub cwd: PathBuf,
    /// Requested via `add` rather than packed from a workspace
    pub is_additional: bool,
    /// Workspace the artifact was packed from
    #[serde(skip)]
    pub workspace: Option<Arc<WorkspaceInfo>>,
}

impl InstallManifest {
    /// Manifest for a packed workspace artifact
    pub fn for_workspace(
        workspace: Arc<WorkspaceInfo>,
        tarball: PathBuf,
        install_root: PathBuf,
    ) -> Self {
        let pkg_name = workspace.name().to_string();
        Self {
            pkg_spec: tarball.to_string_lossy().into_owned(),
            install_path: install_root.join("node_modules").join(&pkg_name),
            pkg_name,
            cwd: install_root,
            is_additional: false,
            workspace: Some(workspace),
        }
    }

    /// Manifest for an additional dependency such as `lodash@4`
    pub fn additional(pkg_spec: &str, install_root: PathBuf) -> Self {
        let pkg_name = additional_pkg_name(pkg_spec).to_string();
        Self {
            pkg_spec: pkg_spec.to_string(),
            install_path: install_root.join("node_modules").join(&pkg_name),
            pkg_name,
            cwd: install_root,
            is_additional: true,
            workspace: None,
        }
    }
}

/// Strip a version suffix from a dependency spec, keeping scoped names intact
fn additional_pkg_name(pkg_spec: &str) -> &str {
    let search_from = usize::from(pkg_spec.starts_with('@'));
    match pkg_spec[search_from..].find('@') {
        Some(idx) => &pkg_spec[..idx + search_from],
        None => pkg_spec,
    }
}

/// An installed package ready to be checked
#[derive(Debug, Clone, Serialize)]
pub struct LintManifest {
    /// Resolved install path
    pub install_path: PathBuf,
    /// Manifest as installed
    pub manifest: PackageJson,
    /// Workspace the package came from
    #[serde(skip)]
    pub workspace: Arc<WorkspaceInfo>,
}

impl LintManifest {
    /// Create a lint manifest
    pub fn new(install_path: PathBuf, manifest: PackageJson, workspace: Arc<WorkspaceInfo>) -> Self {
        Self {
            install_path,
            manifest,
            workspace,
        }
    }

    /// `name@version` of the installed package
    pub fn package_id(&self) -> String {
        self.manifest.package_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let req = PkgManagerRequest::parse("npm@9").unwrap();
        assert_eq!(req.bin, "npm");
        assert_eq!(req.version.as_deref(), Some("9"));
        assert!(!req.wants_system());
        assert_eq!(req.coerced_version(), Some(Version::new(9, 0, 0)));

        let bare = PkgManagerRequest::parse("yarn").unwrap();
        assert!(bare.wants_system());
        assert_eq!(bare.to_string(), "yarn");

        assert!(PkgManagerRequest::parse("npm@9@1").is_none());
        assert!(PkgManagerRequest::parse("").is_none());
    }

    #[test]
    fn test_coerce_versions() {
        let coerce = |s: &str| {
            PkgManagerRequest::parse(&format!("npm@{s}"))
                .unwrap()
                .coerced_version()
        };
        assert_eq!(coerce("9.1"), Some(Version::new(9, 1, 0)));
        assert_eq!(coerce("v10.2.3"), Some(Version::new(10, 2, 3)));
        assert_eq!(coerce("next"), None);
        assert!(PkgManagerRequest::parse("npm@latest").unwrap().wants_system());
    }

    #[test]
    fn test_spec_label_and_key() {
        let spec = PkgManagerSpec::new("npm", Version::new(9, 8, 1), false);
        assert_eq!(spec.label(), "npm@9.8.1");
        assert_eq!(spec.tmp_key(), "npm-9.8.1");

        let system = PkgManagerSpec::new("npm", Version::new(10, 0, 0), true);
        assert_eq!(system.to_string(), "npm@10.0.0 (system)");
    }

    #[test]
    fn test_additional_manifest_names() {
        let root = PathBuf::from("/tmp/npm-9");
        let plain = InstallManifest::additional("lodash@4", root.clone());
        assert_eq!(plain.pkg_name, "lodash");
        assert!(plain.is_additional);
        assert_eq!(plain.install_path, root.join("node_modules/lodash"));

        let scoped = InstallManifest::additional("@types/node@20", root.clone());
        assert_eq!(scoped.pkg_name, "@types/node");

        let bare = InstallManifest::additional("@scope/pkg", root);
        assert_eq!(bare.pkg_name, "@scope/pkg");
    }
}
