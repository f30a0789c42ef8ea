use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use storyloom_core::{Error, Intent, Result, StreamEvent, WorkflowRequest, WorkflowType};

use crate::{EventSink, Workflow};

const STREAM_CAPACITY: usize = 64;

/// Maps intents to registered workflows and drives their execution.
///
/// Degradation ladder when no direct mapping exists: the intent's declared
/// workflow type, then the designated default, then the first registered
/// workflow, then a terminal routing error — never a silent no-op.
pub struct WorkflowExecutor {
    by_intent: HashMap<Intent, Arc<dyn Workflow>>,
    by_type: HashMap<WorkflowType, Arc<dyn Workflow>>,
    by_name: HashMap<String, Arc<dyn Workflow>>,
    default_workflow: Option<Arc<dyn Workflow>>,
    first_registered: Option<Arc<dyn Workflow>>,
}

impl WorkflowExecutor {
    pub fn new() -> Self {
        Self {
            by_intent: HashMap::new(),
            by_type: HashMap::new(),
            by_name: HashMap::new(),
            default_workflow: None,
            first_registered: None,
        }
    }

    /// Register a workflow and map it to the given intents. The first
    /// workflow registered for a type becomes that type's mapping.
    pub fn register(&mut self, workflow: Arc<dyn Workflow>, intents: &[Intent]) {
        let name = workflow.name().to_string();
        info!(workflow = %name, ?intents, "Registered workflow");
        for intent in intents {
            self.by_intent.insert(*intent, workflow.clone());
        }
        self.by_type
            .entry(workflow.workflow_type())
            .or_insert_with(|| workflow.clone());
        if self.first_registered.is_none() {
            self.first_registered = Some(workflow.clone());
        }
        self.by_name.insert(name, workflow);
    }

    /// Designate the fallback workflow used when an intent has no mapping.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        let workflow = self
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Routing(format!("Cannot default to unknown workflow '{name}'")))?;
        self.default_workflow = Some(workflow);
        Ok(())
    }

    pub fn workflow_by_name(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.by_name.get(name).cloned()
    }

    fn resolve(&self, intent: Intent) -> Result<Arc<dyn Workflow>> {
        if let Some(wf) = self.by_intent.get(&intent) {
            return Ok(wf.clone());
        }
        if let Some(wf) = self.by_type.get(&intent.workflow_type()) {
            warn!(?intent, workflow = %wf.name(), "No direct mapping, using workflow-type mapping");
            return Ok(wf.clone());
        }
        if let Some(wf) = &self.default_workflow {
            warn!(?intent, workflow = %wf.name(), "Degrading to default workflow");
            return Ok(wf.clone());
        }
        if let Some(wf) = &self.first_registered {
            warn!(?intent, workflow = %wf.name(), "Degrading to first registered workflow");
            return Ok(wf.clone());
        }
        Err(Error::Routing("No workflow available".to_string()))
    }

    /// Execute the workflow resolved for `intent`, returning the event
    /// stream. The stream always terminates with exactly one `done`; a
    /// failing workflow yields one `error` first and never an exception.
    pub fn execute(
        self: &Arc<Self>,
        intent: Intent,
        request: WorkflowRequest,
    ) -> mpsc::Receiver<StreamEvent> {
        match self.resolve(intent) {
            Ok(workflow) => self.spawn_run(workflow, request),
            Err(e) => Self::terminal_error(&e),
        }
    }

    /// Dispatch a continuation request straight to its paused workflow,
    /// bypassing intent resolution.
    pub fn execute_resume(self: &Arc<Self>, request: WorkflowRequest) -> mpsc::Receiver<StreamEvent> {
        let Some(marker) = request.continuation.clone() else {
            return Self::terminal_error(&Error::Routing(
                "Resume requested without a continuation marker".to_string(),
            ));
        };
        match self.workflow_by_name(&marker.workflow) {
            Some(workflow) => self.spawn_run(workflow, request),
            None => Self::terminal_error(&Error::Routing(format!(
                "Continuation references unknown workflow '{}'",
                marker.workflow
            ))),
        }
    }

    fn spawn_run(
        &self,
        workflow: Arc<dyn Workflow>,
        request: WorkflowRequest,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        tokio::spawn(async move {
            let sink = EventSink::new(tx);
            let name = workflow.name().to_string();
            let run_sink = sink.clone();
            // Inner task so a panicking workflow surfaces as a JoinError
            // here instead of killing the stream unterminated.
            let run = tokio::spawn(async move { workflow.run(&request, &run_sink).await });
            match run.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(workflow = %name, error = %e, "Workflow run failed");
                    sink.emit(StreamEvent::error(&e.to_string())).await;
                }
                Err(e) => {
                    error!(workflow = %name, error = %e, "Workflow run panicked");
                    sink.emit(StreamEvent::error(&format!("Workflow '{name}' panicked")))
                        .await;
                }
            }
            sink.emit(StreamEvent::Done).await;
        });
        rx
    }

    fn terminal_error(e: &Error) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(2);
        let message = e.to_string();
        tokio::spawn(async move {
            let sink = EventSink::new(tx);
            sink.emit(StreamEvent::error(&message)).await;
            sink.emit(StreamEvent::Done).await;
        });
        rx
    }
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    enum StubBehavior {
        Emit,
        Fail,
        Panic,
    }

    struct StubWorkflow {
        name: String,
        kind: WorkflowType,
        behavior: StubBehavior,
    }

    impl StubWorkflow {
        fn simple(name: &str) -> Self {
            Self {
                name: name.to_string(),
                kind: WorkflowType::Simple,
                behavior: StubBehavior::Emit,
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                name: name.to_string(),
                kind: WorkflowType::Simple,
                behavior: StubBehavior::Fail,
            }
        }

        fn panicking(name: &str) -> Self {
            Self {
                name: name.to_string(),
                kind: WorkflowType::Simple,
                behavior: StubBehavior::Panic,
            }
        }
    }

    #[async_trait]
    impl Workflow for StubWorkflow {
        fn name(&self) -> &str {
            &self.name
        }
        fn workflow_type(&self) -> WorkflowType {
            self.kind
        }
        async fn run(&self, _request: &WorkflowRequest, sink: &EventSink) -> super::Result<()> {
            match self.behavior {
                StubBehavior::Fail => return Err(Error::Agent("stub exploded".to_string())),
                StubBehavior::Panic => panic!("stub blew up"),
                StubBehavior::Emit => {}
            }
            sink.emit(StreamEvent::content(&format!("ran {}", self.name)))
                .await;
            Ok(())
        }
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn direct_intent_mapping_wins() {
        let mut executor = WorkflowExecutor::new();
        executor.register(Arc::new(StubWorkflow::simple("writing")), &[Intent::WriteContent]);
        executor.register(Arc::new(StubWorkflow::simple("conversation")), &[Intent::GeneralChat]);
        let executor = Arc::new(executor);

        let events = drain(executor.execute(
            Intent::WriteContent,
            WorkflowRequest::new("s1", "continue"),
        ))
        .await;
        assert_eq!(events[0], StreamEvent::content("ran writing"));
        assert_eq!(*events.last().unwrap(), StreamEvent::Done);
    }

    #[tokio::test]
    async fn unmapped_intent_degrades_through_type_then_default() {
        let mut executor = WorkflowExecutor::new();
        executor.register(Arc::new(StubWorkflow::simple("conversation")), &[Intent::GeneralChat]);
        executor.set_default("conversation").unwrap();
        let executor = Arc::new(executor);

        // Summarize has no direct mapping; its type (simple) maps to the
        // first simple workflow registered
        let events = drain(executor.execute(
            Intent::Summarize,
            WorkflowRequest::new("s1", "sum it up"),
        ))
        .await;
        assert_eq!(events[0], StreamEvent::content("ran conversation"));
    }

    #[tokio::test]
    async fn empty_executor_reports_terminal_routing_error() {
        let executor = Arc::new(WorkflowExecutor::new());
        let events = drain(executor.execute(
            Intent::WriteContent,
            WorkflowRequest::new("s1", "anything"),
        ))
        .await;
        assert!(matches!(events[0], StreamEvent::Error { .. }));
        assert_eq!(*events.last().unwrap(), StreamEvent::Done);
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn workflow_failure_becomes_error_then_done() {
        let mut executor = WorkflowExecutor::new();
        executor.register(Arc::new(StubWorkflow::failing("writing")), &[Intent::WriteContent]);
        let executor = Arc::new(executor);

        let events = drain(executor.execute(
            Intent::WriteContent,
            WorkflowRequest::new("s1", "continue"),
        ))
        .await;
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::Error { message } => assert!(message.contains("stub exploded")),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[tokio::test]
    async fn workflow_panic_becomes_error_then_done() {
        let mut executor = WorkflowExecutor::new();
        executor.register(Arc::new(StubWorkflow::panicking("writing")), &[Intent::WriteContent]);
        let executor = Arc::new(executor);

        let events = drain(executor.execute(
            Intent::WriteContent,
            WorkflowRequest::new("s1", "continue"),
        ))
        .await;
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::Error { message } => assert!(message.contains("panicked")),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[tokio::test]
    async fn resume_dispatches_by_workflow_name() {
        let mut executor = WorkflowExecutor::new();
        executor.register(Arc::new(StubWorkflow::simple("outline")), &[Intent::PlanOutline]);
        let executor = Arc::new(executor);

        let request = WorkflowRequest::new("s1", "dir B").with_continuation(
            storyloom_core::ContinuationMarker {
                workflow: "outline".to_string(),
                execution_id: uuid::Uuid::new_v4(),
            },
        );
        let events = drain(executor.execute_resume(request)).await;
        assert_eq!(events[0], StreamEvent::content("ran outline"));

        let orphan = WorkflowRequest::new("s1", "dir B").with_continuation(
            storyloom_core::ContinuationMarker {
                workflow: "ghost".to_string(),
                execution_id: uuid::Uuid::new_v4(),
            },
        );
        let events = drain(executor.execute_resume(orphan)).await;
        assert!(matches!(events[0], StreamEvent::Error { .. }));
    }
}
