//! Start payload for a repair process instance.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::context::{keys, ProcessContext};

/// Caller identity and system tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Anything else the caller attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The payload a process instance is started with.
///
/// Continuation restarts the instance with exactly this payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    #[serde(default)]
    pub prompt: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Notification target for the proactive variant (e.g. an email address).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<Value>,
}

impl StartPayload {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.metadata.user = Some(user.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.metadata.system = Some(system.into());
        self
    }

    pub fn with_callback(mut self, callback: Value) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Seed a fresh context with `prompt` and `metadata`.
    pub fn seed_context(&self) -> ProcessContext {
        let mut context = ProcessContext::new();
        context.insert(keys::PROMPT, json!(self.prompt));
        context.insert(
            keys::METADATA,
            serde_json::to_value(&self.metadata).unwrap_or_else(|_| json!({})),
        );
        context
    }

    /// Seed a fresh context for the proactive loop, which also records the
    /// notification target.
    pub fn seed_proactive_context(&self) -> ProcessContext {
        let mut context = self.seed_context();
        context.insert(
            keys::NOTIFICATION_INFO,
            self.callback.clone().unwrap_or(Value::Null),
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_parses_reference_shape() {
        let payload: StartPayload = serde_json::from_value(json!({
            "prompt": "repair orders",
            "metadata": {"user": "alice", "system": "temporal-repair-agent", "team": "ops"}
        }))
        .unwrap();

        assert_eq!(payload.prompt, "repair orders");
        assert_eq!(payload.metadata.user.as_deref(), Some("alice"));
        assert_eq!(payload.metadata.extra.get("team"), Some(&json!("ops")));
        assert!(payload.callback.is_none());
    }

    #[test]
    fn test_seed_context() {
        let payload = StartPayload::new("repair orders").with_user("alice");
        let ctx = payload.seed_context();
        assert_eq!(ctx.keys(), vec!["prompt", "metadata"]);
        assert_eq!(ctx.metadata_user().as_deref(), Some("alice"));

        let ctx = payload
            .clone()
            .with_callback(json!({"type": "email", "email": "ops@example.com"}))
            .seed_proactive_context();
        assert_eq!(ctx.keys(), vec!["prompt", "metadata", "notification_info"]);
        assert_eq!(
            ctx.get(keys::NOTIFICATION_INFO).and_then(|v| v.get("type")),
            Some(&json!("email"))
        );
    }
}
