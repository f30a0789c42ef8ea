//! Intent resolution and dispatch. A request flows through three stages,
//! each cheaper than the next would be: continuation markers resume their
//! paused chain directly, the fast path honors hints and `/command`
//! prefixes, and only then does classification run — rules first, with a
//! time-boxed reasoner consulted when the rules are unsure.

pub mod fast_path;
pub mod reasoner;
pub mod rules;

pub use reasoner::{FallbackReasoner, HttpReasoner, ReasonerVerdict};
pub use rules::{IntentClassifier, RuleClassifier};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use storyloom_bus::ContextBus;
use storyloom_core::{
    FastPathResult, IntentResult, IntentSource, RouterConfig, Shortcut, StreamEvent,
    WorkflowRequest,
};
use storyloom_workflow::WorkflowExecutor;

/// Confidence assumed when a reasoner names an intent but omits a score.
const REASONER_DEFAULT_CONFIDENCE: f64 = 0.5;

pub struct IntentRouter {
    classifier: Arc<dyn IntentClassifier>,
    reasoner: Option<Arc<dyn FallbackReasoner>>,
    executor: Arc<WorkflowExecutor>,
    bus: Arc<dyn ContextBus>,
    high_confidence: f64,
    reasoner_timeout: Duration,
}

impl IntentRouter {
    /// Rule-only router with default thresholds.
    pub fn new(executor: Arc<WorkflowExecutor>, bus: Arc<dyn ContextBus>) -> Self {
        Self {
            classifier: Arc::new(RuleClassifier::new()),
            reasoner: None,
            executor,
            bus,
            high_confidence: RouterConfig::default().high_confidence,
            reasoner_timeout: Duration::from_secs(
                RouterConfig::default().reasoner_timeout_secs,
            ),
        }
    }

    /// Apply configured thresholds and, when an API key is present, the
    /// HTTP reasoner.
    pub fn from_config(
        config: &RouterConfig,
        executor: Arc<WorkflowExecutor>,
        bus: Arc<dyn ContextBus>,
    ) -> Self {
        let mut router = Self::new(executor, bus)
            .with_thresholds(config.high_confidence, config.reasoner_timeout_secs);
        if let Some(reasoner) = HttpReasoner::from_config(config) {
            router = router.with_reasoner(Arc::new(reasoner));
        }
        router
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn with_reasoner(mut self, reasoner: Arc<dyn FallbackReasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, high_confidence: f64, reasoner_timeout_secs: u64) -> Self {
        self.high_confidence = high_confidence;
        self.reasoner_timeout = Duration::from_secs(reasoner_timeout_secs);
        self
    }

    /// Resolve the intent without dispatching. Continuation markers are
    /// not considered here; [`route`](Self::route) handles those first.
    pub async fn resolve(&self, request: &WorkflowRequest) -> IntentResult {
        if let FastPathResult::Hit {
            intent,
            target,
            shortcut,
        } = fast_path::check(request)
        {
            let source = match shortcut {
                Shortcut::Hint => IntentSource::Hint,
                Shortcut::Prefix => IntentSource::Prefix,
            };
            let mut result = IntentResult::new(intent, 1.0, source);
            result.target = target;
            return result;
        }

        let phase = self.bus.context(&request.session_id).await.phase;
        let rule = self.classifier.classify(&request.message, phase);
        if rule.confidence >= self.high_confidence {
            return rule;
        }

        let Some(reasoner) = &self.reasoner else {
            return rule;
        };
        match timeout(
            self.reasoner_timeout,
            reasoner.resolve(&request.message, phase, &rule),
        )
        .await
        {
            Ok(Ok(verdict)) => match verdict.intent {
                Some(intent) => {
                    let confidence =
                        verdict.confidence.unwrap_or(REASONER_DEFAULT_CONFIDENCE);
                    // Rank is what matters for runner-ups; the reasoner
                    // does not score them.
                    let alternatives = verdict
                        .alternatives
                        .into_iter()
                        .filter(|i| *i != intent)
                        .map(|i| (i, 0.0))
                        .collect();
                    IntentResult::new(intent, confidence, IntentSource::Reasoner)
                        .with_alternatives(alternatives)
                }
                None => {
                    warn!(session = %request.session_id, "Reasoner gave no intent, keeping rule result");
                    rule
                }
            },
            Ok(Err(e)) => {
                warn!(session = %request.session_id, error = %e, "Reasoner failed, keeping rule result");
                rule
            }
            Err(_) => {
                warn!(
                    session = %request.session_id,
                    timeout_secs = self.reasoner_timeout.as_secs(),
                    "Reasoner timed out, keeping rule result"
                );
                rule
            }
        }
    }

    /// Resolve and dispatch, returning the workflow's event stream. The
    /// stream always ends with exactly one `done`.
    pub async fn route(&self, request: WorkflowRequest) -> mpsc::Receiver<StreamEvent> {
        if request.is_resume() {
            info!(session = %request.session_id, "Continuation marker present, resuming");
            return self.executor.execute_resume(request);
        }

        let result = self.resolve(&request).await;
        info!(
            session = %request.session_id,
            intent = ?result.intent,
            confidence = result.confidence,
            source = ?result.source,
            target = %result.target,
            "Routed"
        );
        self.executor.execute(result.intent, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storyloom_agent::testing::ScriptedAgent;
    use storyloom_agent::AgentRegistry;
    use storyloom_bus::MemoryContextBus;
    use storyloom_core::{CreationPhase, Intent, Result};
    use storyloom_orchestrator::Orchestrator;
    use storyloom_workflow::builtin;

    struct CountingClassifier {
        inner: RuleClassifier,
        calls: AtomicUsize,
    }

    impl CountingClassifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: RuleClassifier::new(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl IntentClassifier for CountingClassifier {
        fn classify(&self, message: &str, phase: CreationPhase) -> IntentResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.classify(message, phase)
        }
    }

    enum Script {
        Verdict(ReasonerVerdict),
        Fail,
        Hang,
    }

    struct ScriptedReasoner {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedReasoner {
        fn verdict(verdict: ReasonerVerdict) -> Arc<Self> {
            Arc::new(Self {
                script: Script::Verdict(verdict),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                script: Script::Fail,
                calls: AtomicUsize::new(0),
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                script: Script::Hang,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FallbackReasoner for ScriptedReasoner {
        async fn resolve(
            &self,
            _message: &str,
            _phase: CreationPhase,
            _rule_hint: &IntentResult,
        ) -> Result<ReasonerVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Verdict(v) => Ok(v.clone()),
                Script::Fail => Err(storyloom_core::Error::Classification(
                    "scripted failure".to_string(),
                )),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(ReasonerVerdict::default())
                }
            }
        }
    }

    fn demo_executor(bus: Arc<MemoryContextBus>) -> Arc<WorkflowExecutor> {
        let mut registry = AgentRegistry::new();
        for name in [
            builtin::agents::WRITER,
            builtin::agents::STYLIST,
            builtin::agents::REVIEWER,
            builtin::agents::CHARACTER,
            builtin::agents::WORLD,
            builtin::agents::SUMMARY,
            builtin::agents::CHAT,
            builtin::agents::OUTLINER,
            builtin::agents::EXPANDER,
            builtin::agents::POLISHER,
        ] {
            registry.register(Arc::new(ScriptedAgent::generation(name, &["out:", name])));
        }
        let registry = Arc::new(registry);
        let orchestrator = Arc::new(Orchestrator::new(bus.clone()));
        Arc::new(builtin::install(registry, orchestrator, bus).unwrap())
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn fast_path_skips_both_classifiers() {
        let bus = Arc::new(MemoryContextBus::new());
        let classifier = CountingClassifier::new();
        let reasoner = ScriptedReasoner::failing();
        let router = IntentRouter::new(demo_executor(bus.clone()), bus)
            .with_classifier(classifier.clone())
            .with_reasoner(reasoner.clone());

        let result = router
            .resolve(&WorkflowRequest::new("s1", "/write continue the duel scene"))
            .await;
        assert_eq!(result.intent, Intent::WriteContent);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.source, IntentSource::Prefix);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confident_rule_result_skips_the_reasoner() {
        let bus = Arc::new(MemoryContextBus::new());
        let reasoner = ScriptedReasoner::failing();
        let router =
            IntentRouter::new(demo_executor(bus.clone()), bus).with_reasoner(reasoner.clone());

        let result = router
            .resolve(&WorkflowRequest::new("s1", "continue the duel scene"))
            .await;
        assert_eq!(result.intent, Intent::WriteContent);
        assert_eq!(result.source, IntentSource::RuleEngine);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsure_rules_defer_to_the_reasoner() {
        let bus = Arc::new(MemoryContextBus::new());
        let reasoner = ScriptedReasoner::verdict(ReasonerVerdict {
            intent: Some(Intent::PlanOutline),
            confidence: None,
            alternatives: vec![Intent::WriteContent],
        });
        let router =
            IntentRouter::new(demo_executor(bus.clone()), bus).with_reasoner(reasoner.clone());

        // "maybe something about the world" scores low for BuildWorld.
        let result = router
            .resolve(&WorkflowRequest::new("s1", "maybe something about the world"))
            .await;
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.intent, Intent::PlanOutline);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.source, IntentSource::Reasoner);
        assert_eq!(result.alternatives, vec![(Intent::WriteContent, 0.0)]);
    }

    #[tokio::test]
    async fn reasoner_failure_keeps_the_rule_result() {
        let bus = Arc::new(MemoryContextBus::new());
        let router = IntentRouter::new(demo_executor(bus.clone()), bus)
            .with_reasoner(ScriptedReasoner::failing());

        let result = router
            .resolve(&WorkflowRequest::new("s1", "maybe something about the world"))
            .await;
        assert_eq!(result.intent, Intent::BuildWorld);
        assert_eq!(result.source, IntentSource::RuleEngine);
    }

    #[tokio::test]
    async fn empty_verdict_keeps_the_rule_result() {
        let bus = Arc::new(MemoryContextBus::new());
        let router = IntentRouter::new(demo_executor(bus.clone()), bus)
            .with_reasoner(ScriptedReasoner::verdict(ReasonerVerdict::default()));

        let result = router
            .resolve(&WorkflowRequest::new("s1", "maybe something about the world"))
            .await;
        assert_eq!(result.intent, Intent::BuildWorld);
        assert_eq!(result.source, IntentSource::RuleEngine);
    }

    #[tokio::test(start_paused = true)]
    async fn reasoner_timeout_degrades_to_rules() {
        let bus = Arc::new(MemoryContextBus::new());
        let reasoner = ScriptedReasoner::hanging();
        let router =
            IntentRouter::new(demo_executor(bus.clone()), bus).with_reasoner(reasoner.clone());

        let result = router
            .resolve(&WorkflowRequest::new("s1", "maybe something about the world"))
            .await;
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.intent, Intent::BuildWorld);
        assert_eq!(result.source, IntentSource::RuleEngine);
    }

    #[tokio::test]
    async fn routed_stream_ends_with_done() {
        let bus = Arc::new(MemoryContextBus::new());
        let router = IntentRouter::new(demo_executor(bus.clone()), bus);

        let events = drain(
            router
                .route(WorkflowRequest::new("s1", "/write continue the duel scene"))
                .await,
        )
        .await;
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::Content { .. })));
        assert_eq!(*events.last().unwrap(), StreamEvent::Done);
        assert_eq!(
            events.iter().filter(|e| **e == StreamEvent::Done).count(),
            1
        );
    }

    #[tokio::test]
    async fn continuation_bypasses_classification() {
        let bus = Arc::new(MemoryContextBus::new());
        let classifier = CountingClassifier::new();
        let router = IntentRouter::new(demo_executor(bus.clone()), bus)
            .with_classifier(classifier.clone());

        let request = WorkflowRequest::new("s1", "the second direction").with_continuation(
            storyloom_core::ContinuationMarker {
                workflow: "outline".to_string(),
                execution_id: uuid::Uuid::new_v4(),
            },
        );
        let events = drain(router.route(request).await).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*events.last().unwrap(), StreamEvent::Done);
    }
}
