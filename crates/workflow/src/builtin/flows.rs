use async_trait::async_trait;

use storyloom_core::{CheckOutcome, Result, SessionContext, WorkflowRequest};

use super::agents;
use super::consistency;
use crate::SimpleFlow;

fn recent_entity_background(session: &SessionContext) -> Option<String> {
    if session.recent_entities.is_empty() {
        return None;
    }
    let lines: Vec<String> = session
        .recent_entities
        .iter()
        .map(|e| format!("- {} ({})", e.name, e.kind))
        .collect();
    Some(format!("Recently active entities:\n{}", lines.join("\n")))
}

/// Content generation: background from recent entities, style guidance
/// from session memory, lexical consistency pass afterwards.
pub struct WritingFlow;

#[async_trait]
impl SimpleFlow for WritingFlow {
    fn name(&self) -> &str {
        "writing"
    }

    fn agent_name(&self) -> &str {
        agents::WRITER
    }

    async fn preprocess(
        &self,
        _request: &WorkflowRequest,
        session: &SessionContext,
    ) -> Result<Option<String>> {
        Ok(recent_entity_background(session))
    }

    fn augment(&self, _request: &WorkflowRequest, session: &SessionContext) -> Option<String> {
        session
            .memory_str("style")
            .map(|style| format!("Match the established narrative voice: {style}"))
    }

    fn postprocess(&self, output: &str, session: &SessionContext) -> Option<CheckOutcome> {
        Some(consistency::quick_check(output, session))
    }
}

/// Revision keeps the plot, improves the prose.
pub struct RevisionFlow;

#[async_trait]
impl SimpleFlow for RevisionFlow {
    fn name(&self) -> &str {
        "revision"
    }

    fn agent_name(&self) -> &str {
        agents::STYLIST
    }

    fn augment(&self, _request: &WorkflowRequest, session: &SessionContext) -> Option<String> {
        let mut instructions =
            "Preserve plot and dialogue beats; improve rhythm and word choice".to_string();
        if let Some(style) = session.memory_str("style") {
            instructions.push_str(&format!("; keep the voice: {style}"));
        }
        Some(instructions)
    }
}

/// Dedicated consistency review; the reviewer's report is parsed into a
/// structured check result.
pub struct ConsistencyFlow;

#[async_trait]
impl SimpleFlow for ConsistencyFlow {
    fn name(&self) -> &str {
        "consistency"
    }

    fn agent_name(&self) -> &str {
        agents::REVIEWER
    }

    async fn preprocess(
        &self,
        _request: &WorkflowRequest,
        session: &SessionContext,
    ) -> Result<Option<String>> {
        Ok(recent_entity_background(session))
    }

    fn postprocess(&self, output: &str, _session: &SessionContext) -> Option<CheckOutcome> {
        Some(consistency::parse_review(output))
    }
}

pub struct CharacterFlow;

#[async_trait]
impl SimpleFlow for CharacterFlow {
    fn name(&self) -> &str {
        "character"
    }

    fn agent_name(&self) -> &str {
        agents::CHARACTER
    }

    async fn preprocess(
        &self,
        _request: &WorkflowRequest,
        session: &SessionContext,
    ) -> Result<Option<String>> {
        Ok(recent_entity_background(session))
    }

    fn augment(&self, _request: &WorkflowRequest, session: &SessionContext) -> Option<String> {
        session
            .memory_str("world")
            .map(|world| format!("Ground the character in the established setting: {world}"))
    }
}

pub struct WorldFlow;

#[async_trait]
impl SimpleFlow for WorldFlow {
    fn name(&self) -> &str {
        "worldbuilding"
    }

    fn agent_name(&self) -> &str {
        agents::WORLD
    }
}

pub struct SummaryFlow;

#[async_trait]
impl SimpleFlow for SummaryFlow {
    fn name(&self) -> &str {
        "summary"
    }

    fn agent_name(&self) -> &str {
        agents::SUMMARY
    }
}

/// Bare conversational fallback. No augmentation, no checks.
pub struct ConversationFlow;

#[async_trait]
impl SimpleFlow for ConversationFlow {
    fn name(&self) -> &str {
        "conversation"
    }

    fn agent_name(&self) -> &str {
        agents::CHAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_core::RecentEntity;

    #[test]
    fn writing_flow_augments_only_with_style_memory() {
        let request = WorkflowRequest::new("s1", "continue");
        let bare = SessionContext::new("s1");
        assert!(WritingFlow.augment(&request, &bare).is_none());

        let styled = bare.with_memory("style", serde_json::json!("dry, clipped"));
        let instructions = WritingFlow.augment(&request, &styled).unwrap();
        assert!(instructions.contains("dry, clipped"));
    }

    #[tokio::test]
    async fn preprocess_lists_recent_entities() {
        let session = SessionContext::new("s1")
            .with_recent_entity(RecentEntity::new("c1", "character", "Mirelle"))
            .with_recent_entity(RecentEntity::new("ch3", "chapter", "The Duel"));
        let background = WritingFlow
            .preprocess(&WorkflowRequest::new("s1", "continue"), &session)
            .await
            .unwrap()
            .unwrap();
        assert!(background.contains("The Duel (chapter)"));
        assert!(background.contains("Mirelle (character)"));
    }
}
