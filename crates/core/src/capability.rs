use serde::{Deserialize, Serialize};

use crate::intent::Intent;
use crate::session::CreationPhase;

/// Broad category an agent belongs to. Routing decisions key off this tag
/// (and the declared intents), never off the agent's concrete type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentCategory {
    /// Produces prose (scenes, chapters, dialogue).
    Generation,
    /// Reviews existing material (consistency, style).
    Review,
    /// Plans structure (outlines, arcs).
    Planning,
    /// Conversational fallback.
    Conversation,
}

/// Whether an agent is kept warm or constructed when first needed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Eager,
    OnDemand,
}

/// Static capability declaration, fixed at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    pub category: AgentCategory,
    /// Intents this agent can serve.
    pub intents: Vec<Intent>,
    /// Creation phases this agent applies to; empty = all phases.
    #[serde(default)]
    pub phases: Vec<CreationPhase>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Rough latency estimate for scheduling decisions.
    #[serde(default)]
    pub estimated_latency_ms: u64,
    /// Relative cost in [0, 1].
    #[serde(default)]
    pub estimated_cost: f64,
}

impl AgentCapability {
    pub fn new(category: AgentCategory, intents: Vec<Intent>) -> Self {
        Self {
            category,
            intents,
            phases: Vec::new(),
            execution_mode: ExecutionMode::default(),
            estimated_latency_ms: 0,
            estimated_cost: 0.0,
        }
    }

    #[must_use]
    pub fn with_phases(mut self, phases: Vec<CreationPhase>) -> Self {
        self.phases = phases;
        self
    }

    #[must_use]
    pub fn on_demand(mut self) -> Self {
        self.execution_mode = ExecutionMode::OnDemand;
        self
    }

    #[must_use]
    pub fn with_estimates(mut self, latency_ms: u64, cost: f64) -> Self {
        self.estimated_latency_ms = latency_ms;
        self.estimated_cost = cost.clamp(0.0, 1.0);
        self
    }

    pub fn supports_intent(&self, intent: Intent) -> bool {
        self.intents.contains(&intent)
    }

    /// Empty phase list means the agent is phase-agnostic.
    pub fn applies_in_phase(&self, phase: CreationPhase) -> bool {
        self.phases.is_empty() || self.phases.contains(&phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_phase_list_applies_everywhere() {
        let cap = AgentCapability::new(AgentCategory::Generation, vec![Intent::WriteContent]);
        assert!(cap.applies_in_phase(CreationPhase::Drafting));
        assert!(cap.applies_in_phase(CreationPhase::Polishing));

        let cap = cap.with_phases(vec![CreationPhase::Drafting]);
        assert!(cap.applies_in_phase(CreationPhase::Drafting));
        assert!(!cap.applies_in_phase(CreationPhase::Polishing));
    }

    #[test]
    fn cost_estimate_is_clamped() {
        let cap = AgentCapability::new(AgentCategory::Review, vec![Intent::CheckConsistency])
            .with_estimates(500, 3.0);
        assert_eq!(cap.estimated_cost, 1.0);
    }
}
