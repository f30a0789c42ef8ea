use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Classification tag for bus events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextEventType {
    ContentGenerated,
    EntityUpdated,
    ConsistencyWarning,
    PhaseChanged,
    AgentStarted,
    AgentCompleted,
    AgentFailed,
    ToolInvoked,
    Custom(String),
}

/// An event published to a session's Context Bus channel.
///
/// Created by any component, published once, never mutated afterwards.
/// Delivery to subscribers is best effort; there is no replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEvent {
    pub id: Uuid,
    pub event_type: ContextEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ContextEvent {
    pub fn new(event_type: ContextEventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            agent: None,
            payload,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn from_agent(mut self, agent: &str) -> Self {
        self.agent = Some(agent.to_string());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn agent_started(agent: &str) -> Self {
        Self::new(ContextEventType::AgentStarted, serde_json::Value::Null).from_agent(agent)
    }

    pub fn agent_completed(agent: &str, output_chars: usize) -> Self {
        Self::new(
            ContextEventType::AgentCompleted,
            serde_json::json!({ "outputChars": output_chars }),
        )
        .from_agent(agent)
    }

    pub fn agent_failed(agent: &str, error: &str) -> Self {
        Self::new(
            ContextEventType::AgentFailed,
            serde_json::json!({ "error": error }),
        )
        .from_agent(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_gets_id_and_timestamp() {
        let e = ContextEvent::new(ContextEventType::ContentGenerated, serde_json::json!("x"));
        assert!(!e.id.is_nil());
        assert!(e.timestamp <= Utc::now());
    }

    #[test]
    fn event_type_serializes_snake_case() {
        let e = ContextEvent::agent_failed("scribe", "boom");
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"agent_failed\""));
        assert!(json.contains("\"scribe\""));
    }
}
