//! CLI command implementations.

pub mod config;
pub mod proactive;
pub mod run;
pub mod session;
