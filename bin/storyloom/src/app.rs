//! Shared wiring for the CLI commands: bus, demo agents, executor, router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use storyloom_agent::{Agent, AgentInput, AgentRegistry};
use storyloom_bus::{ContextBus, MemoryContextBus, RedisContextBus};
use storyloom_core::{AgentCapability, AgentCategory, Config, Intent, Result};
use storyloom_orchestrator::Orchestrator;
use storyloom_router::IntentRouter;
use storyloom_workflow::builtin;

pub struct App {
    pub router: IntentRouter,
    pub bus: Arc<dyn ContextBus>,
}

pub async fn build(config: &Config) -> Result<App> {
    let bus = build_bus(config)?;
    let registry = Arc::new(demo_registry());
    info!(agents = ?registry.eager_agent_names(), "Demo agents ready");
    let orchestrator = Arc::new(Orchestrator::with_config(bus.clone(), &config.orchestrator));
    let executor = Arc::new(builtin::install(registry, orchestrator, bus.clone())?);
    let router = IntentRouter::from_config(&config.router, executor, bus.clone());
    Ok(App { router, bus })
}

fn build_bus(config: &Config) -> Result<Arc<dyn ContextBus>> {
    match config.bus.backend.as_str() {
        "redis" => {
            info!(url = %config.bus.redis_url, "Using redis context bus");
            let bus = RedisContextBus::with_options(
                &config.bus.redis_url,
                "storyloom",
                config.bus.session_ttl_secs,
            )?;
            Ok(Arc::new(bus))
        }
        _ => {
            let bus = Arc::new(MemoryContextBus::with_ttl(Duration::from_secs(
                config.bus.session_ttl_secs,
            )));
            tokio::spawn(
                bus.clone()
                    .run_sweeper(Duration::from_secs(config.bus.sweep_interval_secs)),
            );
            Ok(bus)
        }
    }
}

/// Canned responder standing in for a model-backed agent, so the routing
/// and workflow layers can be exercised end to end from the CLI.
struct CannedAgent {
    name: String,
    capability: AgentCapability,
    reply: String,
}

impl CannedAgent {
    fn new(name: &str, capability: AgentCapability, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            capability,
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl Agent for CannedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn execute(&self, input: AgentInput) -> Result<String> {
        Ok(format!("[{}] {} (re: {})", self.name, self.reply, input.message))
    }
}

fn demo_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    let canned: Vec<CannedAgent> = vec![
        CannedAgent::new(
            builtin::agents::WRITER,
            AgentCapability::new(AgentCategory::Generation, vec![Intent::WriteContent]),
            "drafted the next passage",
        ),
        CannedAgent::new(
            builtin::agents::STYLIST,
            AgentCapability::new(AgentCategory::Generation, vec![Intent::ReviseContent]),
            "reworked the prose",
        ),
        CannedAgent::new(
            builtin::agents::REVIEWER,
            AgentCapability::new(AgentCategory::Review, vec![Intent::CheckConsistency]),
            "no contradictions found",
        ),
        CannedAgent::new(
            builtin::agents::CHARACTER,
            AgentCapability::new(AgentCategory::Generation, vec![Intent::DesignCharacter]),
            "sketched a character profile",
        ),
        CannedAgent::new(
            builtin::agents::WORLD,
            AgentCapability::new(AgentCategory::Generation, vec![Intent::BuildWorld]),
            "extended the setting",
        ),
        CannedAgent::new(
            builtin::agents::SUMMARY,
            AgentCapability::new(AgentCategory::Review, vec![Intent::Summarize]),
            "summarized the story so far",
        ),
        CannedAgent::new(
            builtin::agents::CHAT,
            AgentCapability::new(AgentCategory::Conversation, vec![Intent::GeneralChat]),
            "happy to talk it through",
        ),
        CannedAgent::new(
            builtin::agents::OUTLINER,
            AgentCapability::new(AgentCategory::Planning, vec![Intent::PlanOutline]),
            "Direction A: a slow-burn betrayal. Direction B: the siege begins early",
        ),
        // The post-pause chain steps only run after a user selection, so
        // there is no point keeping them warm
        CannedAgent::new(
            builtin::agents::EXPANDER,
            AgentCapability::new(AgentCategory::Planning, vec![Intent::PlanOutline]).on_demand(),
            "expanded the chosen direction into chapters",
        ),
        CannedAgent::new(
            builtin::agents::POLISHER,
            AgentCapability::new(AgentCategory::Planning, vec![Intent::PlanOutline]).on_demand(),
            "tightened the chapter beats",
        ),
    ];
    for agent in canned {
        registry.register(Arc::new(agent));
    }
    registry
}
