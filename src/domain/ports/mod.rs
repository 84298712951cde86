//! Domain ports (interfaces) for external collaborators.

pub mod activities;

pub use activities::{
    invoke, ActivityError, ActivityKind, ActivityResult, Heartbeat, RepairActivities,
};
