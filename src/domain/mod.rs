//! Domain layer for the repair orchestrator
//!
//! This module contains the process state, activity results and the ports the
//! orchestrator drives.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
