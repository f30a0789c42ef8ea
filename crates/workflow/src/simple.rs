use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

use storyloom_agent::{AgentInput, AgentRegistry};
use storyloom_bus::ContextBus;
use storyloom_core::{
    CheckOutcome, ContextEvent, ContextEventType, Result, SessionContext, StreamEvent,
    WorkflowRequest, WorkflowType,
};
use storyloom_orchestrator::RetryPolicy;

use crate::{EventSink, Workflow};

/// The workflow-specific parts of the fixed 4-phase simple template.
///
/// Defaults make every phase but Execute a no-op; flows override only what
/// they need.
#[async_trait]
pub trait SimpleFlow: Send + Sync {
    fn name(&self) -> &str;

    /// The single agent this flow delegates to.
    fn agent_name(&self) -> &str;

    /// Gather background material for the agent. Default: nothing.
    async fn preprocess(
        &self,
        _request: &WorkflowRequest,
        _session: &SessionContext,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    /// Supplementary instructions injected into the outgoing request.
    /// Only flows that declare a need for augmentation return `Some`.
    fn augment(&self, _request: &WorkflowRequest, _session: &SessionContext) -> Option<String> {
        None
    }

    /// Synchronous check over the accumulated output. Default: none.
    fn postprocess(
        &self,
        _output: &str,
        _session: &SessionContext,
    ) -> Option<CheckOutcome> {
        None
    }
}

/// Driver for the simple template: Preprocess → Augment → Execute
/// (single agent, streamed) → Postprocess. Strictly sequential, no
/// branching back; the terminal `done` is owned by the executor.
///
/// An agent failure before the first chunk is retried within the retry
/// budget. Once output has streamed, a failure is terminal: chunks were
/// already forwarded and the stream cannot be restarted.
pub struct SimpleWorkflow<F: SimpleFlow> {
    flow: F,
    registry: Arc<AgentRegistry>,
    bus: Arc<dyn ContextBus>,
    retry: RetryPolicy,
}

impl<F: SimpleFlow> SimpleWorkflow<F> {
    pub fn new(flow: F, registry: Arc<AgentRegistry>, bus: Arc<dyn ContextBus>) -> Self {
        Self {
            flow,
            registry,
            bus,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl<F: SimpleFlow> Workflow for SimpleWorkflow<F> {
    fn name(&self) -> &str {
        self.flow.name()
    }

    fn workflow_type(&self) -> WorkflowType {
        WorkflowType::Simple
    }

    async fn run(&self, request: &WorkflowRequest, sink: &EventSink) -> Result<()> {
        let agent = self.registry.get(self.flow.agent_name())?;
        let session = self.bus.context(&request.session_id).await;
        if !agent.capability().applies_in_phase(session.phase) {
            warn!(
                agent = %agent.name(),
                phase = ?session.phase,
                "Agent capability does not cover the session's phase"
            );
        }

        // Preprocess
        let background = self.flow.preprocess(request, &session).await?;

        // Augment
        let instructions = self.flow.augment(request, &session);
        if instructions.is_some() {
            debug!(workflow = %self.flow.name(), "Request augmented");
        }

        let mut input = AgentInput::new(&request.message).with_session(session.clone());
        if let Some(bg) = background {
            input = input.with_background(&bg);
        }
        if let Some(extra) = instructions {
            input = input.with_instructions(&extra);
        }

        // Execute: exactly one agent, chunks forwarded as they arrive
        sink.emit(StreamEvent::thought(
            Some(agent.name()),
            &format!("{} is working", agent.name()),
        ))
        .await;
        self.bus
            .publish(&request.session_id, ContextEvent::agent_started(agent.name()))
            .await;

        let mut accumulated = String::new();
        let mut attempt = 1;
        loop {
            let mut streamed_this_attempt = false;
            let mut failure = None;
            {
                let mut chunks = agent.stream(input.clone());
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(text) => {
                            streamed_this_attempt = true;
                            accumulated.push_str(&text);
                            sink.emit(StreamEvent::content(&text)).await;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
            match failure {
                None => break,
                Some(e) if !streamed_this_attempt && attempt < self.retry.max_attempts => {
                    warn!(
                        agent = %agent.name(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Agent failed before streaming, retrying"
                    );
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
                Some(e) => {
                    self.bus
                        .publish(
                            &request.session_id,
                            ContextEvent::agent_failed(agent.name(), &e.to_string()),
                        )
                        .await;
                    return Err(e);
                }
            }
        }

        self.bus
            .publish(
                &request.session_id,
                ContextEvent::agent_completed(agent.name(), accumulated.len()),
            )
            .await;
        self.bus
            .publish(
                &request.session_id,
                ContextEvent::new(
                    ContextEventType::ContentGenerated,
                    serde_json::json!({ "workflow": self.flow.name(), "chars": accumulated.len() }),
                )
                .from_agent(agent.name()),
            )
            .await;

        // Postprocess
        if let Some(outcome) = self.flow.postprocess(&accumulated, &session) {
            for warning in &outcome.warnings {
                self.bus
                    .publish(
                        &request.session_id,
                        ContextEvent::new(
                            ContextEventType::ConsistencyWarning,
                            serde_json::json!({ "warning": warning }),
                        )
                        .from_agent(agent.name()),
                    )
                    .await;
            }
            sink.emit(StreamEvent::CheckResult { result: outcome }).await;
        }

        Ok(())
    }
}
