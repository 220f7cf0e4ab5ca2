//! Load generation and allocation verification against a polyglot server.

pub mod client;
pub mod report;
pub mod results;
pub mod scenarios;
pub mod stats;
pub mod throttle;
