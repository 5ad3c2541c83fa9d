//! Actors of a smoke run.
//!
//! - Smoker: the root coordinator
//! - PkgManagerActor: one backend's lifecycle
//! - RuleActor: one rule against one package
//! - ReporterActor and the EventBus: ordered event delivery

pub mod bus;
pub mod pkg_manager;
pub mod reporter;
pub mod rule;
pub mod smoker;

pub use bus::{EventBus, EventSender};
pub use pkg_manager::{PkgManagerActor, PkgManagerState, RunPlan};
pub use reporter::ReporterActor;
pub use rule::{resolve_rule_configs, RuleActor, RuleOutcome};
pub use smoker::{Smoker, SmokerState};
