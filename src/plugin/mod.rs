//! Plugin system: component contracts and the registry.
//!
//! A plugin bundles rules, package manager backends, reporters and
//! executors. Each registered component is wrapped in a [`Component`]
//! envelope carrying its scoped id and owning plugin.

mod component;
mod pkg_manager;
mod registry;
mod reporter;
mod rule;

pub use component::{component_id, is_blessed, Component, ComponentKind, BLESSED_PLUGINS};
pub use pkg_manager::{
    InstallContext, PackContext, PackageManager, PkgManagerContext, RunScriptContext,
};
pub use registry::{
    PluginApi, PluginFactory, PluginLoader, PluginMetadata, PluginModule, PluginRegistry,
    PluginSource,
};
pub use reporter::{Reporter, ReporterContext};
pub use rule::{Rule, RuleContext};
