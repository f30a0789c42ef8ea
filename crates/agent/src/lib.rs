pub mod registry;
pub mod testing;

use async_trait::async_trait;
use futures::stream::BoxStream;

use storyloom_core::{AgentCapability, Result, SessionContext};

pub use registry::AgentRegistry;

/// Input handed to an agent for one unit of work.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    /// The text the agent works on.
    pub message: String,
    /// Session snapshot at dispatch time.
    pub session: Option<SessionContext>,
    /// Workflow-specific supplementary instructions (augmentation).
    pub instructions: Option<String>,
    /// Background material gathered during preprocess.
    pub background: Option<String>,
}

impl AgentInput {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: &str) -> Self {
        self.background = Some(background.to_string());
        self
    }
}

/// The capability contract every executable unit implements.
///
/// The orchestration layer consumes this trait only; it never inspects the
/// concrete type behind it. Routing decisions key off [`AgentCapability`].
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Static capability declaration, fixed at registration time.
    fn capability(&self) -> &AgentCapability;

    /// Run to completion and return the full output.
    async fn execute(&self, input: AgentInput) -> Result<String>;

    /// Lazy sequence of output chunks. Finite and not restartable.
    ///
    /// The default wraps [`execute`](Agent::execute) as a single chunk;
    /// agents with true streaming backends override it.
    fn stream<'a>(&'a self, input: AgentInput) -> BoxStream<'a, Result<String>> {
        Box::pin(futures::stream::once(
            async move { self.execute(input).await },
        ))
    }
}
