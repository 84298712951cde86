//! Process context accumulated over a repair run.
//!
//! An insertion-ordered mapping from string keys to JSON values. Keys are
//! only ever added or overwritten, never removed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::errors::{DomainError, DomainResult};

/// Well-known context keys written by the orchestrator.
pub mod keys {
    pub const PROMPT: &str = "prompt";
    pub const METADATA: &str = "metadata";
    pub const NOTIFICATION_INFO: &str = "notification_info";
    pub const DETECTION_RESULT: &str = "detection_result";
    pub const ANALYSIS_RESULT: &str = "analysis_result";
    pub const PROBLEMS_TO_REPAIR: &str = "problems_to_repair";
    pub const PLANNING_RESULT: &str = "planning_result";
    pub const NOTIFICATION_RESULT: &str = "notification_result";
    pub const REPAIR_RESULT: &str = "repair_result";
    pub const REPORT_RESULT: &str = "report_result";
    pub const APPROVED_BY: &str = "approved_by";
    pub const REJECTED_BY: &str = "rejected_by";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessContext {
    entries: Map<String, Value>,
}

impl ProcessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Serialize and write a typed value.
    pub fn insert_typed<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> DomainResult<()> {
        let value = serde_json::to_value(value)?;
        self.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Value for `key`, or `NotFound` if the key was never written.
    pub fn value(&self, key: &str) -> DomainResult<Value> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("context key '{key}'")))
    }

    /// Deserialize the value under `key`, if present.
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> DomainResult<Option<T>> {
        self.entries
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(DomainError::from)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in the order they were first written.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// `metadata.user`, the identity of whoever started the run.
    pub fn metadata_user(&self) -> Option<String> {
        self.entries
            .get(keys::METADATA)
            .and_then(|m| m.get("user"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// String value under `key`, or `"unknown"`.
    pub fn identity(&self, key: &str) -> String {
        self.entries
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }
}
