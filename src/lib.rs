//! smoker: smoke-test packages before publishing them
//!
//! This crate packs each workspace with one or more package managers,
//! installs the artifacts into isolated temporary directories, checks the
//! installed packages with rules, and runs custom scripts against them.
//! Behavior is supplied by plugins: package manager backends, rules,
//! reporters and executors.

pub mod actors;
pub mod builtin;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod plugin;
pub mod services;

#[cfg(test)]
mod testing;

pub use actors::Smoker;
pub use config::SmokerConfig;
pub use error::{Result, SmokerError};
