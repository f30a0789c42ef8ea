use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::intent::Intent;

/// Identifies which paused chain a follow-up request resumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationMarker {
    /// Name of the paused workflow.
    pub workflow: String,
    /// Execution id recorded when the chain paused.
    pub execution_id: Uuid,
}

/// An incoming user request, transport-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub session_id: String,
    /// Free-text message body. For a resume request this is the user's
    /// selection.
    pub message: String,
    /// Explicit intent supplied by the caller; bypasses classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_hint: Option<Intent>,
    /// Present when this request continues a paused chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<ContinuationMarker>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowRequest {
    pub fn new(session_id: &str, message: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            message: message.to_string(),
            intent_hint: None,
            continuation: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_hint(mut self, intent: Intent) -> Self {
        self.intent_hint = Some(intent);
        self
    }

    #[must_use]
    pub fn with_continuation(mut self, marker: ContinuationMarker) -> Self {
        self.continuation = Some(marker);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Leading whitespace-delimited token, for command-prefix matching.
    pub fn first_token(&self) -> Option<&str> {
        self.message.split_whitespace().next()
    }

    pub fn is_resume(&self) -> bool {
        self.continuation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_token_skips_leading_whitespace() {
        let req = WorkflowRequest::new("s1", "   /write continue the duel scene");
        assert_eq!(req.first_token(), Some("/write"));

        let blank = WorkflowRequest::new("s1", "   ");
        assert_eq!(blank.first_token(), None);
    }

    #[test]
    fn continuation_marker_serializes_camel_case() {
        let req = WorkflowRequest::new("s1", "the second direction").with_continuation(
            ContinuationMarker {
                workflow: "outline".to_string(),
                execution_id: Uuid::nil(),
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"executionId\""));
        assert!(req.is_resume());
    }
}
