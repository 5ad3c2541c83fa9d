//! Rule actor: one rule checked against one installed package.

use super::bus::EventSender;
use crate::domain::{LintManifest, LintResult, RawRuleSetting, RuleConfig, SmokerEvent};
use crate::error::{ConfigError, RuleError};
use crate::plugin::{Component, PluginRegistry, Rule, RuleContext};
use crate::services::{guarded, OrCancelExt};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Resolve raw rule settings into one config per registered rule.
///
/// Keys must be ids of registered rules. Rules without a setting get their
/// default severity and default options.
pub fn resolve_rule_configs(
    registry: &PluginRegistry,
    raw: &BTreeMap<String, RawRuleSetting>,
) -> Result<BTreeMap<String, RuleConfig>, ConfigError> {
    if let Some(unknown) = raw.keys().find(|id| registry.rule(id).is_none()) {
        return Err(ConfigError::UnknownRule(unknown.clone()));
    }

    let mut resolved = BTreeMap::new();
    for rule in registry.rules() {
        let (severity, options) = raw
            .get(&rule.id)
            .cloned()
            .map(RawRuleSetting::into_parts)
            .unwrap_or((None, None));
        let severity = severity.unwrap_or_else(|| rule.payload.default_severity());

        let options = if severity.is_enabled() {
            rule.payload
                .validate_options(options.as_ref())
                .map_err(|message| ConfigError::InvalidRuleOptions {
                    rule: rule.id.clone(),
                    message,
                })?
        } else {
            Value::Null
        };
        resolved.insert(rule.id.clone(), RuleConfig::new(severity, options));
    }
    Ok(resolved)
}

/// How a rule actor finished
#[derive(Debug, Clone)]
pub enum RuleOutcome {
    Checked(LintResult),
    Faulted(RuleError),
    Aborted,
}

/// Runs one rule against one package
pub struct RuleActor {
    rule: Component<dyn Rule>,
    config: RuleConfig,
    manifest: LintManifest,
    pkg_manager: String,
    events: EventSender,
    cancel: CancellationToken,
}

impl RuleActor {
    pub fn new(
        rule: Component<dyn Rule>,
        config: RuleConfig,
        manifest: LintManifest,
        pkg_manager: impl Into<String>,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rule,
            config,
            manifest,
            pkg_manager: pkg_manager.into(),
            events,
            cancel,
        }
    }

    /// Run the check.
    ///
    /// An error or panic inside the check becomes a [`RuleError`]; issues
    /// reported before the fault are discarded.
    pub async fn run(self) -> RuleOutcome {
        let package_id = self.manifest.package_id();
        let rule_id = self.rule.id.clone();

        if !self.config.is_enabled() {
            return RuleOutcome::Checked(LintResult {
                rule_id,
                package_id,
                issues: Vec::new(),
            });
        }

        self.events.emit(SmokerEvent::RuleBegin {
            pkg_manager: self.pkg_manager.clone(),
            rule: rule_id.clone(),
            package: package_id.clone(),
        });

        let ctx = RuleContext::new(
            rule_id.clone(),
            self.config.severity,
            self.pkg_manager.clone(),
            self.manifest,
        );
        let rule = &self.rule.payload;
        let checked = guarded(rule.check(&ctx, &self.config.options))
            .or_cancel(&self.cancel)
            .await;

        match checked {
            Err(_) => {
                tracing::debug!("Rule {} on {} cancelled", rule_id, package_id);
                RuleOutcome::Aborted
            }
            Ok(Err(message)) => {
                let error = RuleError {
                    rule: rule_id,
                    package: package_id,
                    pkg_manager: self.pkg_manager,
                    message,
                };
                tracing::warn!("{}", error);
                self.events.emit(SmokerEvent::RuleError {
                    error: error.clone(),
                });
                RuleOutcome::Faulted(error)
            }
            Ok(Ok(())) => {
                let issues = ctx.into_issues();
                if issues.is_empty() {
                    self.events.emit(SmokerEvent::RuleOk {
                        pkg_manager: self.pkg_manager,
                        rule: rule_id.clone(),
                        package: package_id.clone(),
                    });
                } else {
                    self.events.emit(SmokerEvent::RuleFailed {
                        pkg_manager: self.pkg_manager,
                        rule: rule_id.clone(),
                        package: package_id.clone(),
                        issues: issues.clone(),
                    });
                }
                RuleOutcome::Checked(LintResult {
                    rule_id,
                    package_id,
                    issues,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::bus::EventBus;
    use crate::domain::{Severity, WorkspaceInfo};
    use crate::plugin::PluginModule;
    use crate::testing::{FaultyRule, StaticRule};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register_module(
                "/test/rules.js",
                PluginModule::new(|api| {
                    api.define_rule(StaticRule::new("quiet"));
                    api.define_rule(StaticRule::new("noisy").with_issue("bad thing"));
                    api.define_rule(FaultyRule::erroring("broken"));
                    api.define_rule(FaultyRule::panicking("explodes"));
                    Ok(())
                }),
            )
            .unwrap();
        registry
    }

    fn manifest() -> LintManifest {
        let raw = r#"{"name":"pkg","version":"1.0.0"}"#;
        let ws = Arc::new(WorkspaceInfo::new(PathBuf::from("/repo"), raw.to_string(), true).unwrap());
        LintManifest::new(PathBuf::from("/tmp/install"), ws.manifest.clone(), ws)
    }

    async fn run_rule(
        registry: &PluginRegistry,
        id: &str,
        severity: Severity,
    ) -> (RuleOutcome, Vec<String>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bus = EventBus::start(vec![("t".to_string(), tx)]);
        let actor = RuleActor::new(
            registry.rule(id).unwrap().clone(),
            RuleConfig::new(severity, json!({})),
            manifest(),
            "npm@9.0.0",
            bus.sender(),
            CancellationToken::new(),
        );
        let outcome = actor.run().await;
        bus.emit(SmokerEvent::SmokeError {
            error: "end".to_string(),
        });
        bus.finish().await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind().to_string());
        }
        (outcome, kinds)
    }

    #[tokio::test]
    async fn test_issues_are_collected() {
        let registry = registry();
        let (outcome, kinds) = run_rule(&registry, "rules/noisy", Severity::Warn).await;
        let RuleOutcome::Checked(result) = outcome else {
            panic!("expected issues");
        };
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::Warn);
        assert_eq!(kinds, vec!["rule-begin", "rule-failed", "smoke-error"]);
    }

    #[tokio::test]
    async fn test_off_rule_is_never_invoked() {
        let registry = registry();
        let (outcome, kinds) = run_rule(&registry, "rules/explodes", Severity::Off).await;
        assert!(matches!(outcome, RuleOutcome::Checked(ref r) if r.issues.is_empty()));
        assert_eq!(kinds, vec!["smoke-error"]);
    }

    #[tokio::test]
    async fn test_errors_and_panics_become_rule_errors() {
        let registry = registry();
        for id in ["rules/broken", "rules/explodes"] {
            let (outcome, kinds) = run_rule(&registry, id, Severity::Error).await;
            assert!(matches!(outcome, RuleOutcome::Faulted(ref e) if e.rule == id));
            assert_eq!(kinds, vec!["rule-begin", "rule-error", "smoke-error"]);
        }
    }

    #[tokio::test]
    async fn test_cancelled_rule_aborts() {
        let registry = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = EventBus::start(vec![("t".to_string(), tx)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let actor = RuleActor::new(
            registry.rule("rules/quiet").unwrap().clone(),
            RuleConfig::new(Severity::Error, json!({})),
            manifest(),
            "npm@9.0.0",
            bus.sender(),
            cancel,
        );
        assert!(matches!(actor.run().await, RuleOutcome::Aborted));
    }

    #[test]
    fn test_resolve_rule_configs() {
        let registry = registry();
        let mut raw = BTreeMap::new();
        raw.insert("rules/noisy".to_string(), RawRuleSetting::Severity(Severity::Warn));
        raw.insert("rules/broken".to_string(), RawRuleSetting::Enabled(false));

        let resolved = resolve_rule_configs(&registry, &raw).unwrap();
        assert_eq!(resolved.len(), 4);
        assert_eq!(resolved["rules/noisy"].severity, Severity::Warn);
        assert_eq!(resolved["rules/noisy"].options, json!({}));
        assert!(!resolved["rules/broken"].is_enabled());
        assert_eq!(resolved["rules/quiet"].severity, Severity::Error);
    }

    #[test]
    fn test_unknown_rule_and_bad_options() {
        let registry = registry();
        let mut raw = BTreeMap::new();
        raw.insert("nope".to_string(), RawRuleSetting::Enabled(true));
        assert!(matches!(
            resolve_rule_configs(&registry, &raw),
            Err(ConfigError::UnknownRule(ref id)) if id == "nope"
        ));

        let mut raw = BTreeMap::new();
        raw.insert(
            "rules/quiet".to_string(),
            RawRuleSetting::WithOptions(Severity::Error, json!("not an object")),
        );
        assert!(matches!(
            resolve_rule_configs(&registry, &raw),
            Err(ConfigError::InvalidRuleOptions { .. })
        ));
    }
}
