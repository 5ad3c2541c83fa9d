//! Component envelopes: a component plus its identity and owning plugin.

use super::PluginMetadata;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Plugins whose components are addressed by bare name
pub const BLESSED_PLUGINS: &[&str] = &["smoker-plugin-default"];

/// Is this plugin one of the blessed plugins?
pub fn is_blessed(plugin: &str) -> bool {
    BLESSED_PLUGINS.contains(&plugin)
}

/// Fully-qualified component id.
///
/// Blessed plugins contribute bare names; everything else is scoped as
/// `<plugin>/<name>`.
pub fn component_id(plugin: &str, name: &str) -> String {
    if is_blessed(plugin) {
        name.to_string()
    } else {
        format!("{plugin}/{name}")
    }
}

/// Check a component name before it is scoped
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.chars().any(char::is_whitespace)
}

/// Check a plugin name; an npm-style `@scope/` prefix is allowed
pub(crate) fn is_valid_plugin_name(name: &str) -> bool {
    match name.strip_prefix('@').and_then(|scoped| scoped.split_once('/')) {
        Some((scope, rest)) => is_valid_name(scope) && is_valid_name(rest),
        None => !name.starts_with('@') && is_valid_name(name),
    }
}

/// What a component is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    Rule,
    PackageManager,
    Reporter,
    Executor,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rule => "rule",
            Self::PackageManager => "package manager",
            Self::Reporter => "reporter",
            Self::Executor => "executor",
        };
        f.write_str(s)
    }
}

/// A registered component with its identity
pub struct Component<T: ?Sized> {
    /// Scoped id, see [`component_id`]
    pub id: String,
    /// Name as defined by the plugin
    pub name: String,
    pub kind: ComponentKind,
    pub plugin: Arc<PluginMetadata>,
    pub payload: Arc<T>,
}

impl<T: ?Sized> Component<T> {
    /// Wrap a payload defined by `plugin`
    pub fn new(
        plugin: Arc<PluginMetadata>,
        kind: ComponentKind,
        name: impl Into<String>,
        payload: Arc<T>,
    ) -> Self {
        let name = name.into();
        Self {
            id: component_id(&plugin.id, &name),
            name,
            kind,
            plugin,
            payload,
        }
    }
}

impl<T: ?Sized> Clone for Component<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            plugin: Arc::clone(&self.plugin),
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("plugin", &self.plugin.id)
            .finish()
    }
}
