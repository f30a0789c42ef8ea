use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusConfig {
    /// "memory" (single instance) or "redis" (shared across instances).
    #[serde(default = "default_bus_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Sessions idle longer than this are dropped.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Sweep cadence for the in-memory backend; Redis relies on key TTL.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_bus_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_session_ttl_secs() -> u64 {
    24 * 3600
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: default_bus_backend(),
            redis_url: default_redis_url(),
            session_ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubles on each further attempt.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_secs() -> u64 {
    1
}

fn default_step_timeout_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// At or above this confidence the rule result is used as-is.
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
    #[serde(default = "default_reasoner_timeout_secs")]
    pub reasoner_timeout_secs: u64,
    #[serde(default)]
    pub reasoner_api_base: Option<String>,
    #[serde(default)]
    pub reasoner_api_key: Option<String>,
    #[serde(default = "default_reasoner_model")]
    pub reasoner_model: String,
}

fn default_high_confidence() -> f64 {
    0.9
}

fn default_reasoner_timeout_secs() -> u64 {
    2
}

fn default_reasoner_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            high_confidence: default_high_confidence(),
            reasoner_timeout_secs: default_reasoner_timeout_secs(),
            reasoner_api_base: None,
            reasoner_api_key: None,
            reasoner_model: default_reasoner_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load from a YAML file, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
