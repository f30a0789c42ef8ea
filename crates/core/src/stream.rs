use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Options presented to the user when a chain pauses for a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionOptions {
    /// Kind of decision requested, e.g. "select_direction".
    pub kind: String,
    /// Prompt shown to the user.
    pub message: String,
    /// The material the user is choosing over (usually the last step's output).
    pub content: String,
    pub allow_custom_input: bool,
}

/// Result of a simple workflow's postprocess check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Typed events streamed back to the caller over any text-streaming
/// transport, one JSON object per line.
///
/// Every run ends with exactly one `done`, whatever happened before it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Generation output chunk.
    Content { text: String },
    /// Progress narration.
    Thought {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// External tool invocation started.
    ToolStart { agent: String, tool: String },
    /// External tool invocation finished.
    ToolEnd {
        agent: String,
        tool: String,
        duration_ms: u64,
    },
    /// A chain paused and needs a user decision before continuing.
    UserInputRequired { options: InteractionOptions },
    /// A chain run finished (successfully or not).
    ChainSummary {
        execution_id: Uuid,
        agent_count: usize,
        success_count: usize,
        failure_count: usize,
        summary: String,
    },
    /// Simple-workflow postprocess result.
    CheckResult { result: CheckOutcome },
    /// Terminal failure.
    Error { message: String },
    /// Always the final event of a run.
    Done,
}

impl StreamEvent {
    pub fn content(text: &str) -> Self {
        Self::Content {
            text: text.to_string(),
        }
    }

    pub fn thought(agent: Option<&str>, message: &str) -> Self {
        Self::Thought {
            agent: agent.map(str::to_string),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}
