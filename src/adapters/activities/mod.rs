//! Implementations of the repair activity port.

pub mod http;
pub mod scripted;

pub use http::HttpActivities;
pub use scripted::{ActivityCall, ScriptedActivities, ScriptedResponse};
