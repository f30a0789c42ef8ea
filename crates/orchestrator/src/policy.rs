use std::time::Duration;

use storyloom_core::config::OrchestratorConfig;

/// Retry budget with exponential backoff: 1s, 2s, 4s, ... between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&OrchestratorConfig> for RetryPolicy {
    fn from(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.base_backoff_secs),
        )
    }
}
