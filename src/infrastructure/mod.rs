//! Infrastructure layer module
//!
//! Process-wide concerns that sit outside the workflow engine:
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;
