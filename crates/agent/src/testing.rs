//! Scripted agents for tests and the demo CLI. No model calls involved.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use storyloom_core::{AgentCapability, AgentCategory, Error, Intent, Result};

use crate::{Agent, AgentInput};

/// Returns its canned chunks, in order, every time it runs.
pub struct ScriptedAgent {
    name: String,
    capability: AgentCapability,
    chunks: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(name: &str, capability: AgentCapability, chunks: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            capability,
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn generation(name: &str, chunks: &[&str]) -> Self {
        Self::new(
            name,
            AgentCapability::new(AgentCategory::Generation, vec![Intent::WriteContent]),
            chunks,
        )
    }

    pub fn review(name: &str, chunks: &[&str]) -> Self {
        Self::new(
            name,
            AgentCapability::new(AgentCategory::Review, vec![Intent::CheckConsistency]),
            chunks,
        )
    }

    pub fn planning(name: &str, chunks: &[&str]) -> Self {
        Self::new(
            name,
            AgentCapability::new(AgentCategory::Planning, vec![Intent::PlanOutline]),
            chunks,
        )
    }

    pub fn conversation(name: &str, chunks: &[&str]) -> Self {
        Self::new(
            name,
            AgentCapability::new(AgentCategory::Conversation, vec![Intent::GeneralChat]),
            chunks,
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn execute(&self, _input: AgentInput) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks.join(""))
    }

    fn stream<'a>(&'a self, _input: AgentInput) -> BoxStream<'a, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(futures::stream::iter(
            self.chunks.clone().into_iter().map(Ok),
        ))
    }
}

/// Fails its first `failures` calls, then succeeds. Exercises retry paths.
pub struct FailingAgent {
    name: String,
    capability: AgentCapability,
    failures: usize,
    calls: AtomicUsize,
}

impl FailingAgent {
    pub fn new(name: &str, failures: usize) -> Self {
        Self {
            name: name.to_string(),
            capability: AgentCapability::new(AgentCategory::Generation, vec![Intent::WriteContent]),
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for FailingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn execute(&self, _input: AgentInput) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(Error::Agent(format!("{} refused (call {})", self.name, call + 1)))
        } else {
            Ok(format!("{} recovered", self.name))
        }
    }
}

/// Sleeps before answering. Exercises races and timeouts.
pub struct SlowAgent {
    name: String,
    capability: AgentCapability,
    delay: Duration,
    output: String,
}

impl SlowAgent {
    pub fn new(name: &str, delay: Duration, output: &str) -> Self {
        Self {
            name: name.to_string(),
            capability: AgentCapability::new(AgentCategory::Generation, vec![Intent::WriteContent]),
            delay,
            output: output.to_string(),
        }
    }
}

#[async_trait]
impl Agent for SlowAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn execute(&self, _input: AgentInput) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(self.output.clone())
    }
}

/// Echoes its input back, prefixed with the agent name. Useful for
/// asserting what a chain step actually received.
pub struct EchoAgent {
    name: String,
    capability: AgentCapability,
}

impl EchoAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capability: AgentCapability::new(AgentCategory::Planning, vec![Intent::PlanOutline]),
        }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn execute(&self, input: AgentInput) -> Result<String> {
        Ok(format!("[{}] {}", self.name, input.message))
    }
}
