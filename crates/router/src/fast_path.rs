use tracing::debug;

use storyloom_core::{FastPathResult, Intent, Shortcut, WorkflowRequest};

/// Shortcut check that runs before any classifier: an explicit intent hint
/// on the request wins outright, otherwise a leading `/command` token is
/// matched against the known prefixes. Either hit resolves at confidence
/// 1.0 and skips classification entirely.
pub fn check(request: &WorkflowRequest) -> FastPathResult {
    if let Some(intent) = request.intent_hint {
        debug!(?intent, "Fast path: explicit hint");
        return FastPathResult::Hit {
            intent,
            target: intent.default_target().to_string(),
            shortcut: Shortcut::Hint,
        };
    }

    if let Some(token) = request.first_token() {
        if let Some(intent) = Intent::from_command_prefix(token) {
            debug!(?intent, token, "Fast path: command prefix");
            return FastPathResult::Hit {
                intent,
                target: intent.default_target().to_string(),
                shortcut: Shortcut::Prefix,
            };
        }
    }

    FastPathResult::Miss
}
