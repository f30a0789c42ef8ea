pub mod capability;
pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod intent;
pub mod message;
pub mod session;
pub mod stream;

pub use capability::{AgentCapability, AgentCategory, ExecutionMode};
pub use chain::{ChainExecutionContext, ChainState, ChainStep, StepOutput};
pub use config::{BusConfig, Config, LogConfig, OrchestratorConfig, RouterConfig};
pub use error::{Error, Result};
pub use event::{ContextEvent, ContextEventType};
pub use intent::{FastPathResult, Intent, IntentResult, IntentSource, Shortcut, WorkflowType};
pub use message::{ContinuationMarker, WorkflowRequest};
pub use session::{CreationPhase, RecentEntity, SessionContext, MAX_RECENT_ENTITIES};
pub use stream::{CheckOutcome, InteractionOptions, StreamEvent};
