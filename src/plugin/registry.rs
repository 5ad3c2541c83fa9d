//! Plugin registry: loads, validates and name-scopes component bundles.
//!
//! Registration is all-or-nothing. A plugin's components are collected
//! through a [`PluginApi`], validated as a batch, and only then committed.

use super::component::{is_valid_name, is_valid_plugin_name, Component, ComponentKind};
use super::{PackageManager, Reporter, Rule};
use crate::error::{PluginError, PluginResult};
use crate::services::guard::panic_message;
use crate::services::Executor;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

/// Factory invoked once per plugin to define its components
pub type PluginFactory = Arc<dyn Fn(&mut PluginApi) -> anyhow::Result<()> + Send + Sync>;

/// What a plugin's entry point evaluates to
#[derive(Clone, Default)]
pub struct PluginModule {
    /// Declared plugin name; defaults to the entry point's file stem
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub factory: Option<PluginFactory>,
}

impl PluginModule {
    /// A module with a factory and no declared metadata
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&mut PluginApi) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Arc::new(factory)),
            ..Self::default()
        }
    }

    /// Declare the plugin name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare the plugin version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Declare a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// Where a plugin comes from
#[derive(Debug, Clone)]
pub enum PluginSource {
    /// An in-process module registered under an entry point
    Module {
        entry_point: String,
        module: PluginModule,
    },
    /// An entry point resolved through the registry's [`PluginLoader`]
    EntryPoint(String),
}

impl PluginSource {
    fn entry_point(&self) -> &str {
        match self {
            Self::Module { entry_point, .. } => entry_point,
            Self::EntryPoint(entry_point) => entry_point,
        }
    }
}

/// Resolves an entry point to a module
pub trait PluginLoader: Send + Sync {
    fn load(&self, entry_point: &str) -> anyhow::Result<PluginModule>;
}

/// Identity and contents of a registered plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginMetadata {
    pub id: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub entry_point: String,
    pub rule_names: Vec<String>,
    pub pkg_manager_names: Vec<String>,
    pub reporter_names: Vec<String>,
    pub executor_names: Vec<String>,
}

/// Handed to a plugin factory to define components
pub struct PluginApi {
    plugin: String,
    rules: Vec<Arc<dyn Rule>>,
    pkg_managers: Vec<Arc<dyn PackageManager>>,
    reporters: Vec<Arc<dyn Reporter>>,
    executors: Vec<(String, Arc<dyn Executor>)>,
}

impl PluginApi {
    fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            rules: Vec::new(),
            pkg_managers: Vec::new(),
            reporters: Vec::new(),
            executors: Vec::new(),
        }
    }

    /// Name of the plugin being defined
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    pub fn define_rule(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Arc::new(rule));
    }

    pub fn define_package_manager(&mut self, pkg_manager: impl PackageManager + 'static) {
        self.pkg_managers.push(Arc::new(pkg_manager));
    }

    pub fn define_reporter(&mut self, reporter: impl Reporter + 'static) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn define_executor(&mut self, name: impl Into<String>, executor: impl Executor + 'static) {
        self.executors.push((name.into(), Arc::new(executor)));
    }

    fn names(&self) -> [(ComponentKind, Vec<String>); 4] {
        [
            (
                ComponentKind::Rule,
                self.rules.iter().map(|r| r.name().to_string()).collect(),
            ),
            (
                ComponentKind::PackageManager,
                self.pkg_managers.iter().map(|p| p.name().to_string()).collect(),
            ),
            (
                ComponentKind::Reporter,
                self.reporters.iter().map(|r| r.name().to_string()).collect(),
            ),
            (
                ComponentKind::Executor,
                self.executors.iter().map(|(name, _)| name.clone()).collect(),
            ),
        ]
    }

    /// Reject invalid or colliding names before anything is committed
    fn validate(&self) -> PluginResult<()> {
        for (kind, names) in self.names() {
            let mut seen = HashSet::new();
            for name in names {
                if !is_valid_name(&name) {
                    return Err(PluginError::InvalidComponentName {
                        plugin: self.plugin.clone(),
                        kind: kind.to_string(),
                        name,
                    });
                }
                if !seen.insert(name.clone()) {
                    return Err(PluginError::ComponentCollision {
                        plugin: self.plugin.clone(),
                        kind: kind.to_string(),
                        name,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Registered plugins and their components
#[derive(Default)]
pub struct PluginRegistry {
    loader: Option<Arc<dyn PluginLoader>>,
    plugins: Vec<Arc<PluginMetadata>>,
    /// Entry point → plugin name
    entry_points: HashMap<String, String>,
    /// Plugin name → entry point
    names: HashMap<String, String>,
    rules: Vec<Component<dyn Rule>>,
    pkg_managers: Vec<Component<dyn PackageManager>>,
    reporters: Vec<Component<dyn Reporter>>,
    executors: Vec<Component<dyn Executor>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry resolving entry points through `loader`
    pub fn with_loader(loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            loader: Some(loader),
            ..Self::default()
        }
    }

    /// Register an in-process module under an entry point
    pub fn register_module(
        &mut self,
        entry_point: impl Into<String>,
        module: PluginModule,
    ) -> PluginResult<Arc<PluginMetadata>> {
        self.register(PluginSource::Module {
            entry_point: entry_point.into(),
            module,
        })
    }

    /// Register a plugin
    pub fn register(&mut self, source: PluginSource) -> PluginResult<Arc<PluginMetadata>> {
        let entry_point = source.entry_point().to_string();
        let module = match source {
            PluginSource::Module { module, .. } => module,
            PluginSource::EntryPoint(entry_point) => self.import(&entry_point)?,
        };

        let name = module
            .name
            .clone()
            .unwrap_or_else(|| default_plugin_name(&entry_point));
        if !is_valid_plugin_name(&name) {
            return Err(PluginError::InvalidPluginName { entry_point, name });
        }

        if let Some(existing) = self.entry_points.get(&entry_point) {
            return Err(PluginError::DuplicatePlugin {
                entry_point,
                existing: existing.clone(),
                name,
            });
        }
        if let Some(existing_entry_point) = self.names.get(&name) {
            return Err(PluginError::PluginConflict {
                name,
                existing_entry_point: existing_entry_point.clone(),
                entry_point,
            });
        }

        let factory = module.factory.clone().ok_or_else(|| PluginError::PluginInit {
            name: name.clone(),
            source: anyhow::anyhow!("module does not export a plugin factory"),
        })?;

        let mut api = PluginApi::new(&name);
        catch_unwind(AssertUnwindSafe(|| factory(&mut api)))
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload)))
            })
            .map_err(|source| PluginError::PluginInit {
                name: name.clone(),
                source,
            })?;
        api.validate()?;

        let [(_, rule_names), (_, pkg_manager_names), (_, reporter_names), (_, executor_names)] =
            api.names();
        let metadata = Arc::new(PluginMetadata {
            id: name.clone(),
            version: module.version,
            description: module.description,
            entry_point: entry_point.clone(),
            rule_names,
            pkg_manager_names,
            reporter_names,
            executor_names,
        });

        self.commit(&metadata, api);
        self.entry_points.insert(entry_point.clone(), name.clone());
        self.names.insert(name.clone(), entry_point);
        self.plugins.push(Arc::clone(&metadata));

        tracing::debug!("Registered plugin {}", name);
        Ok(metadata)
    }

    fn import(&self, entry_point: &str) -> PluginResult<PluginModule> {
        let loader = self.loader.as_ref().ok_or_else(|| PluginError::PluginImport {
            entry_point: entry_point.to_string(),
            source: anyhow::anyhow!("no plugin loader configured"),
        })?;
        loader
            .load(entry_point)
            .map_err(|source| PluginError::PluginImport {
                entry_point: entry_point.to_string(),
                source,
            })
    }

    fn commit(&mut self, plugin: &Arc<PluginMetadata>, api: PluginApi) {
        let envelope = |kind, name: &str| (Arc::clone(plugin), kind, name.to_string());

        for rule in api.rules {
            let (plugin, kind, name) = envelope(ComponentKind::Rule, rule.name());
            self.rules.push(Component::new(plugin, kind, name, rule));
        }
        for pm in api.pkg_managers {
            let (plugin, kind, name) = envelope(ComponentKind::PackageManager, pm.name());
            self.pkg_managers.push(Component::new(plugin, kind, name, pm));
        }
        for reporter in api.reporters {
            let (plugin, kind, name) = envelope(ComponentKind::Reporter, reporter.name());
            self.reporters.push(Component::new(plugin, kind, name, reporter));
        }
        for (name, executor) in api.executors {
            let (plugin, kind, name) = envelope(ComponentKind::Executor, &name);
            self.executors.push(Component::new(plugin, kind, name, executor));
        }
    }

    /// Has this entry point been registered?
    pub fn is_registered(&self, entry_point: &str) -> bool {
        self.entry_points.contains_key(entry_point)
    }

    /// Metadata of every registered plugin, in registration order
    pub fn plugins(&self) -> &[Arc<PluginMetadata>] {
        &self.plugins
    }

    pub fn rules(&self) -> &[Component<dyn Rule>] {
        &self.rules
    }

    pub fn pkg_managers(&self) -> &[Component<dyn PackageManager>] {
        &self.pkg_managers
    }

    pub fn reporters(&self) -> &[Component<dyn Reporter>] {
        &self.reporters
    }

    pub fn executors(&self) -> &[Component<dyn Executor>] {
        &self.executors
    }

    /// Look up a rule by id
    pub fn rule(&self, id: &str) -> Option<&Component<dyn Rule>> {
        self.rules.iter().find(|c| c.id == id)
    }

    /// Look up a reporter by id
    pub fn reporter(&self, id: &str) -> Option<&Component<dyn Reporter>> {
        self.reporters.iter().find(|c| c.id == id)
    }

    /// Look up an executor by id
    pub fn executor(&self, id: &str) -> Option<&Component<dyn Executor>> {
        self.executors.iter().find(|c| c.id == id)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins)
            .finish()
    }
}

/// Plugin name derived from an entry point's file stem
fn default_plugin_name(entry_point: &str) -> String {
    Path::new(entry_point)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| entry_point.to_string())
}
