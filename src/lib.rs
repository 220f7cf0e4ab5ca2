//! Polyglot: deterministic payload assignment for localization experiments.

pub mod assignment;
pub mod config;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod server;
pub mod startup;
