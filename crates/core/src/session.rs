use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::intent::Intent;

/// Upper bound on the recency list. Oldest entries fall off first.
pub const MAX_RECENT_ENTITIES: usize = 20;

/// Where the user currently is in the creation process.
/// Phases bias intent classification toward their typical work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreationPhase {
    /// 构思 — 收集灵感、确定题材
    #[default]
    Conception,
    /// 大纲 — 规划章节与情节走向
    Outlining,
    /// 写作 — 正文产出
    Drafting,
    /// 修改 — 内容调整与一致性修复
    Revising,
    /// 润色 — 语言层面的最后打磨
    Polishing,
}

impl CreationPhase {
    /// Intents that get a score boost when classified during this phase.
    pub fn priority_intents(&self) -> &'static [Intent] {
        match self {
            CreationPhase::Conception => &[Intent::BuildWorld, Intent::DesignCharacter],
            CreationPhase::Outlining => &[Intent::PlanOutline, Intent::DesignCharacter],
            CreationPhase::Drafting => &[Intent::WriteContent],
            CreationPhase::Revising => &[Intent::ReviseContent, Intent::CheckConsistency],
            CreationPhase::Polishing => &[Intent::ReviseContent, Intent::Summarize],
        }
    }
}

/// A domain entity the session recently touched (character, chapter, location...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentEntity {
    pub entity_id: String,
    pub kind: String,
    pub name: String,
}

impl RecentEntity {
    pub fn new(entity_id: &str, kind: &str, name: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

/// Per-session shared state carried by the Context Bus.
///
/// Immutable value type: every mutator consumes `self` and returns a new
/// instance, so a context read from the bus is never changed behind the
/// reader's back. Replacement on the bus is a wholesale atomic swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub phase: CreationPhase,
    /// Most-recent-first, capped at [`MAX_RECENT_ENTITIES`].
    #[serde(default)]
    pub recent_entities: Vec<RecentEntity>,
    /// Free-form working memory (style guides, active chapter, ...).
    #[serde(default)]
    pub memory: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            project_id: None,
            user_id: None,
            phase: CreationPhase::default(),
            recent_entities: Vec::new(),
            memory: HashMap::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Refresh the last-access timestamp.
    #[must_use]
    pub fn touched(mut self) -> Self {
        self.last_active_at = Utc::now();
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: CreationPhase) -> Self {
        self.phase = phase;
        self.last_active_at = Utc::now();
        self
    }

    /// Push an entity to the front of the recency list. An entity already
    /// present (same id) moves to the front instead of duplicating; the
    /// list never exceeds [`MAX_RECENT_ENTITIES`] entries.
    #[must_use]
    pub fn with_recent_entity(mut self, entity: RecentEntity) -> Self {
        self.recent_entities.retain(|e| e.entity_id != entity.entity_id);
        self.recent_entities.insert(0, entity);
        self.recent_entities.truncate(MAX_RECENT_ENTITIES);
        self.last_active_at = Utc::now();
        self
    }

    #[must_use]
    pub fn with_memory(mut self, key: &str, value: serde_json::Value) -> Self {
        self.memory.insert(key.to_string(), value);
        self.last_active_at = Utc::now();
        self
    }

    #[must_use]
    pub fn without_memory(mut self, key: &str) -> Self {
        self.memory.remove(key);
        self.last_active_at = Utc::now();
        self
    }

    pub fn memory_str(&self, key: &str) -> Option<&str> {
        self.memory.get(key).and_then(|v| v.as_str())
    }

    /// True once the session has been idle longer than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.last_active_at > ttl
    }
}
