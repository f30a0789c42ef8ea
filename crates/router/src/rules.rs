use tracing::debug;

use storyloom_core::{CreationPhase, Intent, IntentResult, IntentSource};

/// Synchronous classifier seam. The router only ever needs a message and
/// the session's creation phase; anything heavier belongs behind
/// [`crate::FallbackReasoner`].
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, message: &str, phase: CreationPhase) -> IntentResult;
}

/// Deterministic keyword scorer. Zero-latency, zero-cost, and good enough
/// for the majority of messages; the reasoner only sees what this cannot
/// score confidently.
///
/// Per-intent score: each matched keyword contributes
/// `1.0 + 0.1 × keyword chars`, times 1.5 when the message starts with it.
/// Intents the current phase prioritizes get a ×1.2 boost.
#[derive(Debug, Default)]
pub struct RuleClassifier;

const SCORE_NORM: f64 = 3.0;
const BLANK_CONFIDENCE: f64 = 0.35;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn keyword_score(message: &str, intent: Intent) -> f64 {
        let mut score = 0.0;
        for keyword in intent.keywords() {
            let keyword = keyword.to_lowercase();
            if !message.contains(&keyword) {
                continue;
            }
            let mut s = 1.0 + 0.1 * keyword.chars().count() as f64;
            if message.starts_with(&keyword) {
                s *= 1.5;
            }
            score += s;
        }
        score
    }

    fn round2(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }
}

impl IntentClassifier for RuleClassifier {
    fn classify(&self, message: &str, phase: CreationPhase) -> IntentResult {
        let message = message.trim().to_lowercase();
        if message.is_empty() {
            return IntentResult::new(Intent::GeneralChat, BLANK_CONFIDENCE, IntentSource::Default);
        }

        let mut scores: Vec<(Intent, f64)> = Intent::ALL
            .iter()
            .map(|&intent| (intent, Self::keyword_score(&message, intent)))
            .collect();
        let matched = scores.iter().filter(|(_, s)| *s > 0.0).count();
        if matched == 0 {
            return IntentResult::new(Intent::GeneralChat, BLANK_CONFIDENCE, IntentSource::Default);
        }

        for (intent, score) in scores.iter_mut() {
            if phase.priority_intents().contains(intent) {
                *score *= 1.2;
            }
        }

        // First strictly-greater wins, so ties fall to declaration order
        let (best_intent, best_score) = scores
            .iter()
            .copied()
            .fold((Intent::GeneralChat, 0.0), |acc, (intent, score)| {
                if score > acc.1 {
                    (intent, score)
                } else {
                    acc
                }
            });

        let mut confidence = (best_score / SCORE_NORM).min(1.0);
        if matched == 1 {
            confidence *= 1.2;
        } else if matched > 3 {
            confidence *= 0.9;
        }
        confidence = Self::round2(confidence);

        let mut alternatives: Vec<(Intent, f64)> = scores
            .iter()
            .filter(|(intent, score)| *intent != best_intent && *score > 0.0)
            .map(|(intent, score)| (*intent, Self::round2((score / SCORE_NORM).min(1.0))))
            .collect();
        alternatives.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        alternatives.truncate(3);

        debug!(
            intent = ?best_intent,
            confidence,
            matched,
            "Rule classification"
        );
        IntentResult::new(best_intent, confidence, IntentSource::RuleEngine)
            .with_alternatives(alternatives)
    }
}
