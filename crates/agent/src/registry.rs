use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use storyloom_core::{AgentCategory, Error, ExecutionMode, Intent, Result};

use crate::Agent;

/// Registry of executable agents, keyed by name.
///
/// Lookup goes through declared capability tags (category, supported
/// intents, phases) — never through the agent's concrete type.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its declared name. Re-registering a name
    /// replaces the previous agent.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        info!(
            agent = %name,
            category = ?agent.capability().category,
            intents = agent.capability().intents.len(),
            "Registered agent"
        );
        self.agents.insert(name, agent);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Routing(format!("No agent registered as '{name}'")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agents whose capability declares support for `intent`.
    pub fn find_for_intent(&self, intent: Intent) -> Vec<Arc<dyn Agent>> {
        let mut found: Vec<Arc<dyn Agent>> = self
            .agents
            .values()
            .filter(|a| a.capability().supports_intent(intent))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        debug!(?intent, count = found.len(), "Capability lookup");
        found
    }

    pub fn find_by_category(&self, category: AgentCategory) -> Vec<Arc<dyn Agent>> {
        let mut found: Vec<Arc<dyn Agent>> = self
            .agents
            .values()
            .filter(|a| a.capability().category == category)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    /// Names of agents declared eager (kept warm at startup).
    pub fn eager_agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .agents
            .values()
            .filter(|a| a.capability().execution_mode == ExecutionMode::Eager)
            .map(|a| a.name().to_string())
            .collect();
        names.sort();
        names
    }
}
