//! Adapters for the collaborators behind the activity port.

pub mod activities;

pub use activities::{HttpActivities, ScriptedActivities, ScriptedResponse};
