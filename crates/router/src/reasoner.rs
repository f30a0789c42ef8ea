//! Fallback classification for messages the rule engine cannot score
//! confidently. The router bounds every call with a timeout and degrades
//! to the rule result on any failure, so implementations may be slow or
//! flaky without taking routing down with them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use storyloom_core::{CreationPhase, Error, Intent, IntentResult, Result, RouterConfig};

/// A structured second opinion. `intent` absent means the reasoner could
/// not produce a usable verdict and the rule result stands; `confidence`
/// absent with an intent present is filled in at 0.5 by the router.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReasonerVerdict {
    pub intent: Option<Intent>,
    pub confidence: Option<f64>,
    /// Ranked runner-ups, best first.
    #[serde(default)]
    pub alternatives: Vec<Intent>,
}

#[async_trait]
pub trait FallbackReasoner: Send + Sync {
    /// Classify `message`, given the session phase and the rule engine's
    /// low-confidence hint.
    async fn resolve(
        &self,
        message: &str,
        phase: CreationPhase,
        rule_hint: &IntentResult,
    ) -> Result<ReasonerVerdict>;
}

/// Reasoner backed by an OpenAI-compatible chat-completions endpoint. Asks
/// for a strict JSON verdict and refuses to guess beyond what parses.
pub struct HttpReasoner {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpReasoner {
    pub fn new(api_base: Option<&str>, api_key: &str, model: &str) -> Self {
        let api_base = api_base
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Build from config; `None` when no API key is configured.
    pub fn from_config(config: &RouterConfig) -> Option<Self> {
        config.reasoner_api_key.as_ref().map(|key| {
            Self::new(
                config.reasoner_api_base.as_deref(),
                key,
                &config.reasoner_model,
            )
        })
    }

    fn build_prompt(message: &str, phase: CreationPhase, rule_hint: &IntentResult) -> String {
        let intents: Vec<String> = Intent::ALL
            .iter()
            .filter_map(|i| serde_json::to_value(i).ok())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        format!(
            "You classify a fiction-writing assistant's user messages into one intent.\n\
             Allowed intents: {intents}.\n\
             The author is currently in the {phase:?} phase.\n\
             A keyword scorer tentatively suggested {hint:?} at confidence {conf:.2}.\n\
             Respond with ONLY a JSON object: {{\"intent\": \"...\", \"confidence\": 0.0-1.0, \
             \"alternatives\": [\"...\"]}}.\n\n\
             Message: {message}",
            intents = intents.join(", "),
            hint = rule_hint.intent,
            conf = rule_hint.confidence,
        )
    }
}

#[async_trait]
impl FallbackReasoner for HttpReasoner {
    async fn resolve(
        &self,
        message: &str,
        phase: CreationPhase,
        rule_hint: &IntentResult,
    ) -> Result<ReasonerVerdict> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": Self::build_prompt(message, phase, rule_hint)}
            ],
            "temperature": 0.0,
            "max_tokens": 200,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Reasoner request timed out: {e}"))
                } else {
                    Error::Classification(format!("Reasoner request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Classification(format!(
                "Reasoner returned {status}: {detail}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::Classification(format!("Reasoner reply unreadable: {e}")))?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Classification("Reasoner reply has no content".to_string()))?;
        debug!(model = %self.model, content, "Reasoner verdict received");
        parse_verdict(content)
    }
}

/// Extract the verdict object from a model reply, tolerating code fences
/// and surrounding prose.
pub fn parse_verdict(content: &str) -> Result<ReasonerVerdict> {
    let start = content.find('{');
    let end = content.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(Error::Classification(
            "Reasoner reply contains no JSON object".to_string(),
        ));
    };
    if end < start {
        return Err(Error::Classification(
            "Reasoner reply contains no JSON object".to_string(),
        ));
    }
    serde_json::from_str(&content[start..=end])
        .map_err(|e| Error::Classification(format!("Unparseable reasoner verdict: {e}")))
}
