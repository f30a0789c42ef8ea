use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use storyloom_agent::{Agent, AgentRegistry};
use storyloom_bus::ContextBus;
use storyloom_core::{
    ChainExecutionContext, ChainState, ChainStep, ContextEvent, ContextEventType,
    ContinuationMarker, Error, InteractionOptions, Result, StreamEvent, WorkflowRequest,
    WorkflowType,
};

use crate::{EventSink, Workflow};

type OptionsRenderer = Box<dyn Fn(&str) -> InteractionOptions + Send + Sync>;

fn default_options(content: &str) -> InteractionOptions {
    InteractionOptions {
        kind: "select_direction".to_string(),
        message: "Choose how to continue, or type your own direction".to_string(),
        content: content.to_string(),
        allow_custom_input: true,
    }
}

/// An ordered multi-agent sequence, optionally paused once for a user
/// decision.
///
/// The pause is logical, not a runtime suspension: the run up to the
/// interaction point ends normally after emitting `user_input_required`,
/// and a later request carrying a [`ContinuationMarker`] executes the
/// remaining steps — possibly on a different instance, since the pause
/// record lives in session memory on the bus.
pub struct ChainWorkflow {
    name: String,
    steps: Vec<ChainStep>,
    registry: Arc<AgentRegistry>,
    orchestrator: Arc<storyloom_orchestrator::Orchestrator>,
    bus: Arc<dyn ContextBus>,
    options_renderer: OptionsRenderer,
}

pub struct ChainWorkflowBuilder {
    name: String,
    steps: Vec<ChainStep>,
    options_renderer: Option<OptionsRenderer>,
}

impl ChainWorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
            options_renderer: None,
        }
    }

    #[must_use]
    pub fn step(mut self, agent_name: &str) -> Self {
        self.steps.push(ChainStep::agent(agent_name));
        self
    }

    /// Insert the user-interaction marker after the steps added so far.
    #[must_use]
    pub fn pause_for_user(mut self) -> Self {
        self.steps.push(ChainStep::UserInteraction);
        self
    }

    /// Override how interaction options are rendered from the last step's
    /// output.
    #[must_use]
    pub fn options_renderer(
        mut self,
        renderer: impl Fn(&str) -> InteractionOptions + Send + Sync + 'static,
    ) -> Self {
        self.options_renderer = Some(Box::new(renderer));
        self
    }

    pub fn build(
        self,
        registry: Arc<AgentRegistry>,
        orchestrator: Arc<storyloom_orchestrator::Orchestrator>,
        bus: Arc<dyn ContextBus>,
    ) -> Result<ChainWorkflow> {
        let markers = self
            .steps
            .iter()
            .filter(|s| matches!(s, ChainStep::UserInteraction))
            .count();
        if markers > 1 {
            return Err(Error::Config(format!(
                "Chain '{}' declares {} interaction points; at most one is allowed",
                self.name, markers
            )));
        }
        if let Some(position) = self
            .steps
            .iter()
            .position(|s| matches!(s, ChainStep::UserInteraction))
        {
            if position == 0 || position == self.steps.len() - 1 {
                return Err(Error::Config(format!(
                    "Chain '{}' places its interaction point with no step before or after it",
                    self.name
                )));
            }
        }
        if self.steps.iter().all(|s| s.agent_name().is_none()) {
            return Err(Error::Config(format!("Chain '{}' has no agent steps", self.name)));
        }
        Ok(ChainWorkflow {
            name: self.name,
            steps: self.steps,
            registry,
            orchestrator,
            bus,
            options_renderer: self.options_renderer.unwrap_or_else(|| Box::new(default_options)),
        })
    }
}

impl ChainWorkflow {
    pub fn builder(name: &str) -> ChainWorkflowBuilder {
        ChainWorkflowBuilder::new(name)
    }

    fn interaction_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| matches!(s, ChainStep::UserInteraction))
    }

    pub fn requires_interaction(&self) -> bool {
        self.interaction_index().is_some()
    }

    fn pause_memory_key(&self) -> String {
        format!("chain:{}", self.name)
    }

    fn resolve(&self, names: &[&str]) -> Result<Vec<Arc<dyn Agent>>> {
        names.iter().map(|n| self.registry.get(n)).collect()
    }

    /// Agent names up to (and excluding) the interaction marker, or the
    /// whole chain when no interaction is declared.
    fn agents_before_pause(&self) -> Vec<&str> {
        let end = self.interaction_index().unwrap_or(self.steps.len());
        self.steps[..end]
            .iter()
            .filter_map(ChainStep::agent_name)
            .collect()
    }

    fn agents_after_pause(&self) -> Vec<&str> {
        match self.interaction_index() {
            Some(marker) => self.steps[marker + 1..]
                .iter()
                .filter_map(ChainStep::agent_name)
                .collect(),
            None => Vec::new(),
        }
    }

    async fn publish_state(&self, session_id: &str, state: ChainState, execution_id: uuid::Uuid) {
        let payload = serde_json::json!({
            "workflow": self.name,
            "state": state,
            "executionId": execution_id,
        });
        self.bus
            .publish(
                session_id,
                ContextEvent::new(ContextEventType::Custom("chain_state".to_string()), payload),
            )
            .await;
    }

    async fn emit_summary(&self, sink: &EventSink, chain: &ChainExecutionContext) {
        let summary = if chain.aborted {
            format!(
                "Chain '{}' aborted: {}",
                self.name,
                chain.abort_reason.as_deref().unwrap_or("unknown reason")
            )
        } else {
            format!(
                "Chain '{}' completed {} step(s)",
                self.name,
                chain.steps.len()
            )
        };
        sink.emit(StreamEvent::ChainSummary {
            execution_id: chain.execution_id,
            agent_count: chain.steps.len(),
            success_count: chain.success_count(),
            failure_count: chain.failure_count(),
            summary,
        })
        .await;
    }

    async fn run_segment(
        &self,
        sink: &EventSink,
        session_id: &str,
        agent_names: &[&str],
        input: &str,
    ) -> Result<ChainExecutionContext> {
        let agents = self.resolve(agent_names)?;
        match self.orchestrator.execute_chain(&agents, input, Some(session_id)).await {
            Ok(chain) => Ok(chain),
            Err(Error::Chain { reason, context }) => {
                self.publish_state(session_id, ChainState::Aborted, context.execution_id)
                    .await;
                self.emit_summary(sink, &context).await;
                Err(Error::Chain { reason, context })
            }
            Err(e) => Err(e),
        }
    }

    async fn start(&self, request: &WorkflowRequest, sink: &EventSink) -> Result<()> {
        let pre = self.agents_before_pause();
        sink.emit(StreamEvent::thought(
            None,
            &format!("Running chain '{}' ({} step(s))", self.name, pre.len()),
        ))
        .await;

        let chain = self
            .run_segment(sink, &request.session_id, &pre, &request.message)
            .await?;

        if !self.requires_interaction() {
            if let Some(output) = chain.last_output() {
                sink.emit(StreamEvent::content(output)).await;
            }
            self.publish_state(&request.session_id, ChainState::Completed, chain.execution_id)
                .await;
            self.emit_summary(sink, &chain).await;
            return Ok(());
        }

        // Pause: persist enough for any instance to resume later
        let record = serde_json::json!({
            "executionId": chain.execution_id,
            "originalMessage": request.message,
        });
        let session = self.bus.context(&request.session_id).await;
        self.bus
            .update_context(
                &request.session_id,
                session.with_memory(&self.pause_memory_key(), record),
            )
            .await;
        self.publish_state(
            &request.session_id,
            ChainState::PausedAwaitingInput,
            chain.execution_id,
        )
        .await;

        let options = (self.options_renderer)(chain.last_output().unwrap_or_default());
        sink.emit(StreamEvent::thought(
            None,
            &format!(
                "Chain '{}' paused (execution {}), awaiting user selection",
                self.name, chain.execution_id
            ),
        ))
        .await;
        sink.emit(StreamEvent::UserInputRequired { options }).await;
        Ok(())
    }

    async fn resume(
        &self,
        request: &WorkflowRequest,
        marker: &ContinuationMarker,
        sink: &EventSink,
    ) -> Result<()> {
        if marker.workflow != self.name {
            return Err(Error::Routing(format!(
                "Continuation for '{}' dispatched to chain '{}'",
                marker.workflow, self.name
            )));
        }
        let remaining = self.agents_after_pause();
        if remaining.is_empty() {
            return Err(Error::Routing(format!(
                "Chain '{}' has nothing to resume",
                self.name
            )));
        }

        let session = self.bus.context(&request.session_id).await;
        let key = self.pause_memory_key();
        let original = match session.memory.get(&key) {
            Some(record) => {
                if let Some(recorded) = record.get("executionId").and_then(|v| v.as_str()) {
                    if recorded != marker.execution_id.to_string() {
                        warn!(
                            workflow = %self.name,
                            recorded,
                            requested = %marker.execution_id,
                            "Continuation references a different execution; resuming latest pause"
                        );
                    }
                }
                record
                    .get("originalMessage")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            }
            None => {
                warn!(workflow = %self.name, "No pause record found, resuming without original request");
                String::new()
            }
        };

        // Embed the user's selection alongside the original request
        let enriched = format!(
            "User selected: {}\n\nOriginal request: {}",
            request.message, original
        );
        debug!(workflow = %self.name, steps = remaining.len(), "Resuming chain");
        sink.emit(StreamEvent::thought(
            None,
            &format!("Resuming chain '{}' with your selection", self.name),
        ))
        .await;

        let result = self
            .run_segment(sink, &request.session_id, &remaining, &enriched)
            .await;

        // The pause record is spent either way
        let session = self.bus.context(&request.session_id).await;
        self.bus
            .update_context(&request.session_id, session.without_memory(&key))
            .await;

        let chain = result?;
        if let Some(output) = chain.last_output() {
            sink.emit(StreamEvent::content(output)).await;
        }
        self.publish_state(&request.session_id, ChainState::Completed, chain.execution_id)
            .await;
        self.emit_summary(sink, &chain).await;
        Ok(())
    }
}

#[async_trait]
impl Workflow for ChainWorkflow {
    fn name(&self) -> &str {
        &self.name
    }

    fn workflow_type(&self) -> WorkflowType {
        WorkflowType::Chain
    }

    async fn run(&self, request: &WorkflowRequest, sink: &EventSink) -> Result<()> {
        match &request.continuation {
            Some(marker) => self.resume(request, marker, sink).await,
            None => self.start(request, sink).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_agent::testing::{EchoAgent, FailingAgent, ScriptedAgent};
    use storyloom_bus::MemoryContextBus;
    use storyloom_core::config::OrchestratorConfig;
    use storyloom_orchestrator::Orchestrator;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Fixture {
        registry: Arc<AgentRegistry>,
        orchestrator: Arc<Orchestrator>,
        bus: Arc<MemoryContextBus>,
    }

    fn fixture(register: impl FnOnce(&mut AgentRegistry)) -> Fixture {
        let mut registry = AgentRegistry::new();
        register(&mut registry);
        let bus = Arc::new(MemoryContextBus::new());
        let config = OrchestratorConfig {
            max_attempts: 1,
            base_backoff_secs: 0,
            step_timeout_secs: 30,
        };
        Fixture {
            registry: Arc::new(registry),
            orchestrator: Arc::new(Orchestrator::with_config(bus.clone(), &config)),
            bus,
        }
    }

    async fn collect(
        workflow: &ChainWorkflow,
        request: &WorkflowRequest,
    ) -> (Result<()>, Vec<StreamEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let sink = EventSink::new(tx);
        let result = workflow.run(request, &sink).await;
        drop(sink);
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        (result, events)
    }

    #[tokio::test]
    async fn straight_chain_threads_and_summarizes() {
        let f = fixture(|r| {
            r.register(Arc::new(EchoAgent::new("outliner")));
            r.register(Arc::new(EchoAgent::new("polisher")));
        });
        let workflow = ChainWorkflow::builder("outline")
            .step("outliner")
            .step("polisher")
            .build(f.registry, f.orchestrator, f.bus)
            .unwrap();

        let (result, events) = collect(&workflow, &WorkflowRequest::new("s1", "three arcs")).await;
        result.unwrap();

        let content = events.iter().find_map(|e| match e {
            StreamEvent::Content { text } => Some(text.clone()),
            _ => None,
        });
        assert_eq!(content.as_deref(), Some("[polisher] [outliner] three arcs"));

        match events.last().unwrap() {
            StreamEvent::ChainSummary {
                agent_count,
                success_count,
                failure_count,
                ..
            } => {
                assert_eq!(*agent_count, 2);
                assert_eq!(*success_count, 2);
                assert_eq!(*failure_count, 0);
            }
            other => panic!("expected chain_summary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pause_runs_only_the_leading_steps_and_records_state() {
        let expander = Arc::new(ScriptedAgent::planning("expander", &["expanded"]));
        let f = fixture(|_| {});
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedAgent::planning("outliner", &["dir A / dir B"])));
        registry.register(expander.clone());
        let registry = Arc::new(registry);
        let workflow = ChainWorkflow::builder("outline")
            .step("outliner")
            .pause_for_user()
            .step("expander")
            .build(registry, f.orchestrator, f.bus.clone())
            .unwrap();

        let (result, events) =
            collect(&workflow, &WorkflowRequest::new("s1", "plan the heist arc")).await;
        result.unwrap();

        let options = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::UserInputRequired { options } => Some(options.clone()),
                _ => None,
            })
            .expect("user_input_required event");
        assert_eq!(options.content, "dir A / dir B");
        assert!(options.allow_custom_input);
        assert_eq!(expander.call_count(), 0);

        let session = f.bus.context("s1").await;
        let record = session.memory.get("chain:outline").expect("pause record");
        assert_eq!(
            record.get("originalMessage").and_then(|v| v.as_str()),
            Some("plan the heist arc")
        );
    }

    #[tokio::test]
    async fn resume_executes_remaining_steps_with_selection_embedded() {
        let outliner = Arc::new(ScriptedAgent::planning("outliner", &["dir A / dir B"]));
        let mut registry = AgentRegistry::new();
        registry.register(outliner.clone());
        registry.register(Arc::new(EchoAgent::new("expander")));
        registry.register(Arc::new(EchoAgent::new("polisher")));
        let f = fixture(|_| {});
        let workflow = ChainWorkflow::builder("outline")
            .step("outliner")
            .pause_for_user()
            .step("expander")
            .step("polisher")
            .build(Arc::new(registry), f.orchestrator, f.bus.clone())
            .unwrap();

        // Fresh run pauses after the outliner
        let (result, _) =
            collect(&workflow, &WorkflowRequest::new("s1", "plan the heist arc")).await;
        result.unwrap();
        assert_eq!(outliner.call_count(), 1);

        // Resume with the user's selection
        let session = f.bus.context("s1").await;
        let execution_id = session
            .memory
            .get("chain:outline")
            .and_then(|r| r.get("executionId"))
            .and_then(|v| v.as_str())
            .map(|s| Uuid::parse_str(s).unwrap())
            .expect("recorded execution id");
        let resume = WorkflowRequest::new("s1", "dir B").with_continuation(ContinuationMarker {
            workflow: "outline".to_string(),
            execution_id,
        });
        let (result, events) = collect(&workflow, &resume).await;
        result.unwrap();

        // Outliner did not run again; both remaining steps ran in order
        assert_eq!(outliner.call_count(), 1);
        let content = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::Content { text } => Some(text.clone()),
                _ => None,
            })
            .expect("content event");
        assert!(content.starts_with("[polisher] [expander] User selected: dir B"));
        assert!(content.contains("Original request: plan the heist arc"));

        // Pause record is consumed
        assert!(f.bus.context("s1").await.memory.get("chain:outline").is_none());
    }

    #[tokio::test]
    async fn failing_step_aborts_and_reports() {
        let f = fixture(|r| {
            r.register(Arc::new(EchoAgent::new("outliner")));
            r.register(Arc::new(FailingAgent::new("expander", 99)));
            r.register(Arc::new(EchoAgent::new("polisher")));
        });
        let workflow = ChainWorkflow::builder("outline")
            .step("outliner")
            .step("expander")
            .step("polisher")
            .build(f.registry, f.orchestrator, f.bus)
            .unwrap();

        let (result, events) = collect(&workflow, &WorkflowRequest::new("s1", "go")).await;
        assert!(matches!(result, Err(Error::Chain { .. })));

        match events.last().unwrap() {
            StreamEvent::ChainSummary {
                success_count,
                failure_count,
                ..
            } => {
                assert_eq!(*success_count, 1);
                assert_eq!(*failure_count, 1);
            }
            other => panic!("expected chain_summary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn builder_rejects_malformed_interaction_points() {
        let f = fixture(|r| {
            r.register(Arc::new(EchoAgent::new("a")));
        });
        let err = ChainWorkflow::builder("bad")
            .step("a")
            .pause_for_user()
            .build(f.registry.clone(), f.orchestrator.clone(), f.bus.clone());
        assert!(matches!(err, Err(Error::Config(_))));

        let err = ChainWorkflow::builder("worse")
            .pause_for_user()
            .step("a")
            .build(f.registry, f.orchestrator, f.bus);
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
