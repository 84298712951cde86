//! Display helpers for CLI output formatting.

pub mod table;

pub use table::{list_table, plan_table, repair_table};
