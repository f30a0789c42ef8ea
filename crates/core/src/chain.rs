use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a chain run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    NotStarted,
    Running,
    Completed,
    Aborted,
    PausedAwaitingInput,
}

/// One position in a chain definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainStep {
    /// Run the named agent.
    Agent { name: String },
    /// Pure pause marker; no agent runs here.
    UserInteraction,
}

impl ChainStep {
    pub fn agent(name: &str) -> Self {
        Self::Agent {
            name: name.to_string(),
        }
    }

    pub fn agent_name(&self) -> Option<&str> {
        match self {
            ChainStep::Agent { name } => Some(name),
            ChainStep::UserInteraction => None,
        }
    }
}

/// Recorded outcome of one executed chain step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    pub agent: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutput {
    pub fn success(agent: &str, content: &str) -> Self {
        Self {
            agent: agent.to_string(),
            success: true,
            content: Some(content.to_string()),
            error: None,
        }
    }

    pub fn failure(agent: &str, error: &str) -> Self {
        Self {
            agent: agent.to_string(),
            success: false,
            content: None,
            error: Some(error.to_string()),
        }
    }
}

/// Step-by-step record of a chain run.
///
/// Appended to while the run progresses; once the abort latch is set no
/// further steps are recorded, whatever callers attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExecutionContext {
    pub execution_id: Uuid,
    pub steps: Vec<StepOutput>,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ChainExecutionContext {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            steps: Vec::new(),
            aborted: false,
            abort_reason: None,
            started_at: Utc::now(),
        }
    }

    /// Record a step outcome. Ignored once the run is aborted.
    pub fn record(&mut self, output: StepOutput) {
        if self.aborted {
            tracing::warn!(
                execution_id = %self.execution_id,
                agent = %output.agent,
                "Dropping step record for aborted chain"
            );
            return;
        }
        self.steps.push(output);
    }

    /// Set the abort latch. First reason wins.
    pub fn abort(&mut self, reason: &str) {
        if !self.aborted {
            self.aborted = true;
            self.abort_reason = Some(reason.to_string());
        }
    }

    pub fn success_count(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.success).count()
    }

    /// Output of the last successful step, if any.
    pub fn last_output(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.success)
            .and_then(|s| s.content.as_deref())
    }
}

impl Default for ChainExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_latch_blocks_further_records() {
        let mut ctx = ChainExecutionContext::new();
        ctx.record(StepOutput::success("outliner", "three arcs"));
        ctx.abort("expander failed");
        ctx.record(StepOutput::success("polisher", "ignored"));

        assert_eq!(ctx.steps.len(), 1);
        assert!(ctx.aborted);
        assert_eq!(ctx.abort_reason.as_deref(), Some("expander failed"));
    }

    #[test]
    fn first_abort_reason_wins() {
        let mut ctx = ChainExecutionContext::new();
        ctx.abort("first");
        ctx.abort("second");
        assert_eq!(ctx.abort_reason.as_deref(), Some("first"));
    }

    #[test]
    fn counts_and_last_output() {
        let mut ctx = ChainExecutionContext::new();
        ctx.record(StepOutput::success("a", "one"));
        ctx.record(StepOutput::failure("b", "boom"));
        assert_eq!(ctx.success_count(), 1);
        assert_eq!(ctx.failure_count(), 1);
        assert_eq!(ctx.last_output(), Some("one"));
    }
}
