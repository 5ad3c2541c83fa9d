//! The blessed plugin shipped with smoker.
//!
//! Its components are addressed by bare name: `npm`, `no-banned-files`,
//! `console`, `system` and so on.

mod npm;
mod reporters;
mod rules;

pub use npm::Npm;
pub use reporters::{ConsoleReporter, JsonReporter};
pub use rules::{NoBannedFiles, NoMissingEntryPoint};

use crate::error::PluginResult;
use crate::plugin::{PluginMetadata, PluginModule, PluginRegistry, BLESSED_PLUGINS};
use crate::services::SystemExecutor;
use std::sync::Arc;

/// Entry point the builtin plugin is registered under
pub const ENTRY_POINT: &str = "builtin:smoker-plugin-default";

/// Module defining every builtin component
pub fn plugin() -> PluginModule {
    PluginModule::new(|api| {
        api.define_executor("system", SystemExecutor::new());
        api.define_package_manager(Npm);
        api.define_rule(NoBannedFiles);
        api.define_rule(NoMissingEntryPoint);
        api.define_reporter(ConsoleReporter);
        api.define_reporter(JsonReporter);
        Ok(())
    })
    .named(BLESSED_PLUGINS[0])
    .with_version(env!("CARGO_PKG_VERSION"))
    .with_description("Builtin package managers, rules and reporters")
}

/// Register the builtin plugin
pub fn register(registry: &mut PluginRegistry) -> PluginResult<Arc<PluginMetadata>> {
    registry.register_module(ENTRY_POINT, plugin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_are_bare() {
        let mut registry = PluginRegistry::new();
        let metadata = register(&mut registry).unwrap();

        assert_eq!(metadata.id, "smoker-plugin-default");
        assert!(registry.executor("system").is_some());
        assert!(registry.rule("no-banned-files").is_some());
        assert!(registry.rule("no-missing-entry-point").is_some());
        assert!(registry.reporter("console").is_some());
        assert!(registry.reporter("json").is_some());
        assert_eq!(registry.pkg_managers()[0].id, "npm");
    }

    #[test]
    fn test_builtin_registers_once() {
        let mut registry = PluginRegistry::new();
        register(&mut registry).unwrap();
        assert!(register(&mut registry).is_err());
    }
}
