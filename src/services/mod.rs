//! Infrastructure services for smoker.
//!
//! This module contains:
//! - Executor: subprocess execution behind a trait
//! - Loader: workspace discovery, manifests, temp dirs, backend resolution
//! - Cancellation and fault-capture helpers shared by the actors

mod cancel;
pub mod executor;
pub mod guard;
pub mod loader;

pub use cancel::{Cancelled, OrCancelExt};
pub use executor::{ExecOptions, Executor, SystemExecutor};
pub use guard::guarded;
pub use loader::ResolvedPkgManager;
