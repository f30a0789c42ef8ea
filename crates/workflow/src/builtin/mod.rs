//! The shipped workflow set: one simple flow per writing intent plus the
//! pausable outline chain.

pub mod consistency;
pub mod flows;

use std::sync::Arc;

use storyloom_agent::AgentRegistry;
use storyloom_bus::ContextBus;
use storyloom_core::{Intent, InteractionOptions, Result};
use storyloom_orchestrator::Orchestrator;

use crate::{ChainWorkflow, SimpleWorkflow, WorkflowExecutor};

use flows::{
    CharacterFlow, ConsistencyFlow, ConversationFlow, RevisionFlow, SummaryFlow, WorldFlow,
    WritingFlow,
};

/// Agent names the built-in workflows dispatch to. Deployments register
/// their own implementations under these names.
pub mod agents {
    pub const WRITER: &str = "scribe";
    pub const STYLIST: &str = "stylist";
    pub const REVIEWER: &str = "lorekeeper";
    pub const CHARACTER: &str = "casting";
    pub const WORLD: &str = "cartographer";
    pub const SUMMARY: &str = "archivist";
    pub const CHAT: &str = "companion";
    pub const OUTLINER: &str = "outliner";
    pub const EXPANDER: &str = "expander";
    pub const POLISHER: &str = "polisher";
}

/// Build the executor with the full built-in workflow set registered and
/// `conversation` designated as the default.
pub fn install(
    registry: Arc<AgentRegistry>,
    orchestrator: Arc<Orchestrator>,
    bus: Arc<dyn ContextBus>,
) -> Result<WorkflowExecutor> {
    // Startup visibility: an intent nobody declares support for will still
    // route by name, but it is usually a registration mistake.
    for intent in Intent::ALL {
        if registry.find_for_intent(intent).is_empty() {
            tracing::warn!(?intent, "No registered agent declares this intent");
        }
    }

    let mut executor = WorkflowExecutor::new();

    executor.register(
        Arc::new(
            SimpleWorkflow::new(WritingFlow, registry.clone(), bus.clone())
                .with_retry(orchestrator.retry_policy()),
        ),
        &[Intent::WriteContent],
    );
    executor.register(
        Arc::new(
            SimpleWorkflow::new(RevisionFlow, registry.clone(), bus.clone())
                .with_retry(orchestrator.retry_policy()),
        ),
        &[Intent::ReviseContent],
    );
    executor.register(
        Arc::new(
            SimpleWorkflow::new(ConsistencyFlow, registry.clone(), bus.clone())
                .with_retry(orchestrator.retry_policy()),
        ),
        &[Intent::CheckConsistency],
    );
    executor.register(
        Arc::new(
            SimpleWorkflow::new(CharacterFlow, registry.clone(), bus.clone())
                .with_retry(orchestrator.retry_policy()),
        ),
        &[Intent::DesignCharacter],
    );
    executor.register(
        Arc::new(
            SimpleWorkflow::new(WorldFlow, registry.clone(), bus.clone())
                .with_retry(orchestrator.retry_policy()),
        ),
        &[Intent::BuildWorld],
    );
    executor.register(
        Arc::new(
            SimpleWorkflow::new(SummaryFlow, registry.clone(), bus.clone())
                .with_retry(orchestrator.retry_policy()),
        ),
        &[Intent::Summarize],
    );
    executor.register(
        Arc::new(
            SimpleWorkflow::new(ConversationFlow, registry.clone(), bus.clone())
                .with_retry(orchestrator.retry_policy()),
        ),
        &[Intent::GeneralChat],
    );

    let outline = ChainWorkflow::builder("outline")
        .step(agents::OUTLINER)
        .pause_for_user()
        .step(agents::EXPANDER)
        .step(agents::POLISHER)
        .options_renderer(|content| InteractionOptions {
            kind: "select_direction".to_string(),
            message: "Pick one of the proposed directions, or describe your own".to_string(),
            content: content.to_string(),
            allow_custom_input: true,
        })
        .build(registry, orchestrator, bus)?;
    executor.register(Arc::new(outline), &[Intent::PlanOutline]);

    executor.set_default("conversation")?;
    Ok(executor)
}
