pub mod builtin;
pub mod chain;
pub mod executor;
pub mod simple;

use async_trait::async_trait;
use tokio::sync::mpsc;

use storyloom_core::{Result, StreamEvent, WorkflowRequest, WorkflowType};

pub use chain::{ChainWorkflow, ChainWorkflowBuilder};
pub use executor::WorkflowExecutor;
pub use simple::{SimpleFlow, SimpleWorkflow};

/// Outgoing event channel handed to a running workflow.
///
/// Sends are best effort: a caller that hung up just means nobody is
/// reading anymore, never an error for the workflow.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: StreamEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Event receiver dropped, discarding stream event");
        }
    }
}

/// A named, intent-scoped execution recipe.
///
/// Workflows emit progress through the sink but never emit the terminal
/// `error`/`done` pair themselves; the [`WorkflowExecutor`] owns run
/// termination so that every stream ends with exactly one `done`.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    fn workflow_type(&self) -> WorkflowType;

    async fn run(&self, request: &WorkflowRequest, sink: &EventSink) -> Result<()>;
}
