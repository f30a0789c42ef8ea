pub mod policy;

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use storyloom_agent::{Agent, AgentInput};
use storyloom_bus::ContextBus;
use storyloom_core::config::OrchestratorConfig;
use storyloom_core::{ChainExecutionContext, ContextEvent, Error, Result, StepOutput};

pub use policy::RetryPolicy;

/// Generic concurrency primitives over [`Agent`] instances.
///
/// Constructed with its collaborators injected; nothing here reaches for a
/// global pool or ambient event system. Lifecycle events go to the Context
/// Bus whenever a session id is available (best effort, not transactional).
pub struct Orchestrator {
    bus: Arc<dyn ContextBus>,
    retry: RetryPolicy,
    step_timeout: Duration,
}

impl Orchestrator {
    pub fn new(bus: Arc<dyn ContextBus>) -> Self {
        Self::with_config(bus, &OrchestratorConfig::default())
    }

    pub fn with_config(bus: Arc<dyn ContextBus>, config: &OrchestratorConfig) -> Self {
        Self {
            bus,
            retry: RetryPolicy::from(config),
            step_timeout: Duration::from_secs(config.step_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn notify(&self, session_id: Option<&str>, event: ContextEvent) {
        if let Some(id) = session_id {
            self.bus.publish(id, event).await;
        }
    }

    /// Fan out one input to N agents and join them all.
    ///
    /// Results come back in input order, not completion order. A failing
    /// task yields `None` for its slot instead of aborting its siblings;
    /// "crashed" and "no answer" are indistinguishable in the return shape,
    /// so callers needing the difference must watch `agent_failed` events.
    pub async fn execute_parallel(
        &self,
        agents: &[Arc<dyn Agent>],
        input: &AgentInput,
        session_id: Option<&str>,
    ) -> Vec<Option<String>> {
        let handles: Vec<_> = agents
            .iter()
            .map(|agent| {
                let agent = Arc::clone(agent);
                let input = input.clone();
                tokio::spawn(async move {
                    let name = agent.name().to_string();
                    (name, agent.execute(input).await)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((name, Ok(output))) => {
                    self.notify(session_id, ContextEvent::agent_completed(&name, output.len()))
                        .await;
                    results.push(Some(output));
                }
                Ok((name, Err(e))) => {
                    warn!(agent = %name, error = %e, "Parallel task failed, slot set to None");
                    self.notify(session_id, ContextEvent::agent_failed(&name, &e.to_string()))
                        .await;
                    results.push(None);
                }
                Err(e) => {
                    warn!(error = %e, "Parallel task panicked, slot set to None");
                    results.push(None);
                }
            }
        }
        results
    }

    /// Fan out one input to N agents and return the first success.
    ///
    /// Losing tasks are abandoned, not cancelled: they run to completion in
    /// the background and may still publish completion events afterwards.
    pub async fn execute_race(
        &self,
        agents: &[Arc<dyn Agent>],
        input: &AgentInput,
        session_id: Option<&str>,
    ) -> Result<String> {
        if agents.is_empty() {
            return Err(Error::Agent("Race over zero agents".to_string()));
        }

        let mut pending: FuturesUnordered<_> = agents
            .iter()
            .map(|agent| {
                let agent = Arc::clone(agent);
                let input = input.clone();
                tokio::spawn(async move {
                    let name = agent.name().to_string();
                    (name, agent.execute(input).await)
                })
            })
            .collect();

        let mut last_error = None;
        while let Some(joined) = pending.next().await {
            match joined {
                Ok((name, Ok(output))) => {
                    debug!(agent = %name, "Race winner");
                    self.notify(session_id, ContextEvent::agent_completed(&name, output.len()))
                        .await;
                    // Remaining handles are dropped; their tasks keep running detached
                    return Ok(output);
                }
                Ok((name, Err(e))) => {
                    warn!(agent = %name, error = %e, "Racer failed");
                    self.notify(session_id, ContextEvent::agent_failed(&name, &e.to_string()))
                        .await;
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(error = %e, "Racer panicked");
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Agent("All racers failed".to_string())))
    }

    /// Execute one agent with the retry budget, backing off exponentially
    /// between attempts. Exhaustion publishes `agent_failed` and surfaces
    /// the last error.
    pub async fn execute_with_retry(
        &self,
        agent: &Arc<dyn Agent>,
        input: &AgentInput,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.notify(session_id, ContextEvent::agent_started(agent.name()))
            .await;

        let mut last_error = Error::Agent("No attempt made".to_string());
        for attempt in 1..=self.retry.max_attempts {
            match agent.execute(input.clone()).await {
                Ok(output) => {
                    self.notify(
                        session_id,
                        ContextEvent::agent_completed(agent.name(), output.len()),
                    )
                    .await;
                    return Ok(output);
                }
                Err(e) => {
                    warn!(
                        agent = %agent.name(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Agent attempt failed"
                    );
                    last_error = e;
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        self.notify(
            session_id,
            ContextEvent::agent_failed(agent.name(), &last_error.to_string()),
        )
        .await;
        Err(last_error)
    }

    /// Run agents strictly in order, threading each step's output into the
    /// next step's input. Each step gets one `step_timeout` budget that
    /// bounds its whole retry loop, backoff sleeps included, so a flaky
    /// agent can never hold the chain longer than the per-step timeout.
    /// The first step failure aborts the whole chain and surfaces the
    /// partial execution record.
    pub async fn execute_chain(
        &self,
        agents: &[Arc<dyn Agent>],
        initial_input: &str,
        session_id: Option<&str>,
    ) -> Result<ChainExecutionContext> {
        let session = match session_id {
            Some(id) => Some(self.bus.context(id).await),
            None => None,
        };

        let mut chain = ChainExecutionContext::new();
        let mut current = initial_input.to_string();

        for agent in agents {
            let mut input = AgentInput::new(&current);
            if let Some(ref ctx) = session {
                input = input.with_session(ctx.clone());
            }

            let step = timeout(
                self.step_timeout,
                self.execute_with_retry(agent, &input, session_id),
            )
            .await;

            match step {
                Ok(Ok(output)) => {
                    chain.record(StepOutput::success(agent.name(), &output));
                    current = output;
                }
                Ok(Err(e)) => {
                    let reason = format!("Step '{}' failed: {e}", agent.name());
                    chain.record(StepOutput::failure(agent.name(), &e.to_string()));
                    chain.abort(&reason);
                    return Err(Error::Chain {
                        reason,
                        context: Box::new(chain),
                    });
                }
                Err(_) => {
                    let reason = format!(
                        "Step '{}' timed out after {:?}",
                        agent.name(),
                        self.step_timeout
                    );
                    chain.record(StepOutput::failure(agent.name(), &reason));
                    chain.abort(&reason);
                    self.notify(
                        session_id,
                        ContextEvent::agent_failed(agent.name(), &reason),
                    )
                    .await;
                    return Err(Error::Chain {
                        reason,
                        context: Box::new(chain),
                    });
                }
            }
        }

        debug!(
            execution_id = %chain.execution_id,
            steps = chain.steps.len(),
            "Chain completed"
        );
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_agent::testing::{EchoAgent, FailingAgent, ScriptedAgent, SlowAgent};
    use storyloom_bus::MemoryContextBus;
    use storyloom_core::ContextEventType;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(MemoryContextBus::new()))
    }

    fn fast_orchestrator(max_attempts: u32) -> Orchestrator {
        let config = OrchestratorConfig {
            max_attempts,
            base_backoff_secs: 0,
            step_timeout_secs: 30,
        };
        Orchestrator::with_config(Arc::new(MemoryContextBus::new()), &config)
    }

    #[tokio::test]
    async fn parallel_preserves_input_order_and_isolates_failures() {
        let orch = orchestrator();
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(SlowAgent::new("slow", Duration::from_millis(50), "slow done")),
            Arc::new(FailingAgent::new("broken", 99)),
            Arc::new(ScriptedAgent::generation("fast", &["fast done"])),
        ];

        let results = orch
            .execute_parallel(&agents, &AgentInput::new("go"), None)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_deref(), Some("slow done"));
        assert_eq!(results[1], None);
        assert_eq!(results[2].as_deref(), Some("fast done"));
    }

    #[tokio::test]
    async fn race_returns_first_success() {
        let orch = orchestrator();
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(SlowAgent::new("tortoise", Duration::from_secs(5), "late")),
            Arc::new(ScriptedAgent::generation("hare", &["early"])),
        ];

        let winner = orch
            .execute_race(&agents, &AgentInput::new("go"), None)
            .await
            .unwrap();
        assert_eq!(winner, "early");
    }

    #[tokio::test]
    async fn race_skips_failures_and_errors_when_everyone_loses() {
        let orch = fast_orchestrator(1);
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(FailingAgent::new("a", 99)),
            Arc::new(ScriptedAgent::generation("b", &["answer"])),
        ];
        let winner = orch
            .execute_race(&agents, &AgentInput::new("go"), None)
            .await
            .unwrap();
        assert_eq!(winner, "answer");

        let losers: Vec<Arc<dyn Agent>> = vec![
            Arc::new(FailingAgent::new("x", 99)),
            Arc::new(FailingAgent::new("y", 99)),
        ];
        assert!(orch
            .execute_race(&losers, &AgentInput::new("go"), None)
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backs_off_exponentially() {
        let orch = orchestrator();
        let agent = Arc::new(FailingAgent::new("flaky", 99));
        let started = tokio::time::Instant::now();

        let result = orch
            .execute_with_retry(&(agent.clone() as Arc<dyn Agent>), &AgentInput::new("go"), None)
            .await;

        assert!(result.is_err());
        assert_eq!(agent.call_count(), 3);
        // Two backoffs between three attempts: 1s + 2s
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn retry_recovers_within_budget() {
        let orch = fast_orchestrator(3);
        let agent = Arc::new(FailingAgent::new("flaky", 2));

        let output = orch
            .execute_with_retry(&(agent.clone() as Arc<dyn Agent>), &AgentInput::new("go"), None)
            .await
            .unwrap();

        assert_eq!(output, "flaky recovered");
        assert_eq!(agent.call_count(), 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_publishes_failure_event() {
        let bus = Arc::new(MemoryContextBus::new());
        let config = OrchestratorConfig {
            max_attempts: 2,
            base_backoff_secs: 0,
            step_timeout_secs: 30,
        };
        let orch = Orchestrator::with_config(bus.clone(), &config);
        let mut rx = bus.subscribe("s1").await;

        let agent: Arc<dyn Agent> = Arc::new(FailingAgent::new("doomed", 99));
        let result = orch
            .execute_with_retry(&agent, &AgentInput::new("go"), Some("s1"))
            .await;
        assert!(result.is_err());

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == ContextEventType::AgentFailed {
                assert_eq!(event.agent.as_deref(), Some("doomed"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn chain_threads_output_into_next_step() {
        let orch = orchestrator();
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(EchoAgent::new("first")),
            Arc::new(EchoAgent::new("second")),
        ];

        let chain = orch.execute_chain(&agents, "seed", None).await.unwrap();
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.last_output(), Some("[second] [first] seed"));
        assert!(!chain.aborted);
    }

    #[tokio::test]
    async fn chain_aborts_on_failing_step_and_skips_the_rest() {
        let orch = fast_orchestrator(1);
        let third = Arc::new(ScriptedAgent::generation("third", &["never"]));
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(EchoAgent::new("first")),
            Arc::new(FailingAgent::new("second", 99)),
            third.clone(),
        ];

        let err = orch.execute_chain(&agents, "seed", None).await.unwrap_err();
        match err {
            Error::Chain { reason, context } => {
                assert!(reason.contains("second"));
                assert!(context.aborted);
                assert_eq!(context.success_count(), 1);
                assert_eq!(context.failure_count(), 1);
                assert_eq!(third.call_count(), 0);
            }
            other => panic!("expected chain error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chain_step_budget_covers_retries_and_backoff() {
        let config = OrchestratorConfig {
            max_attempts: 3,
            base_backoff_secs: 1,
            step_timeout_secs: 2,
        };
        let orch = Orchestrator::with_config(Arc::new(MemoryContextBus::new()), &config);
        let flaky = Arc::new(FailingAgent::new("flaky", 99));
        let agents: Vec<Arc<dyn Agent>> = vec![flaky.clone()];

        let err = orch.execute_chain(&agents, "seed", None).await.unwrap_err();
        match err {
            Error::Chain { reason, context } => {
                assert!(reason.contains("timed out"));
                assert!(context.aborted);
            }
            other => panic!("expected chain error, got {other:?}"),
        }
        // Fails at 0s, backs off 1s, fails at 1s; the 2s step budget
        // expires during the second backoff, before a third attempt
        assert_eq!(flaky.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn chain_step_timeout_aborts_with_reason() {
        let config = OrchestratorConfig {
            max_attempts: 1,
            base_backoff_secs: 0,
            step_timeout_secs: 1,
        };
        let orch = Orchestrator::with_config(Arc::new(MemoryContextBus::new()), &config);
        let agents: Vec<Arc<dyn Agent>> =
            vec![Arc::new(SlowAgent::new("glacial", Duration::from_secs(60), "late"))];

        let err = orch.execute_chain(&agents, "seed", None).await.unwrap_err();
        match err {
            Error::Chain { reason, context } => {
                assert!(reason.contains("timed out"));
                assert!(context.aborted);
            }
            other => panic!("expected chain error, got {other:?}"),
        }
    }
}
