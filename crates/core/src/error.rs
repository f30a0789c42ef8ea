use thiserror::Error;

use crate::chain::ChainExecutionContext;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Chain aborted: {reason}")]
    Chain {
        reason: String,
        /// Partial execution record up to the failing step.
        context: Box<ChainExecutionContext>,
    },

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
