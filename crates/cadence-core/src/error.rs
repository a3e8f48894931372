//! Error types shared by every Cadence crate.

use thiserror::Error;

/// The unified error type for Cadence.
#[derive(Debug, Error)]
pub enum CadenceError {
    /// A cron expression could not be parsed.
    #[error("invalid schedule '{expression}': {reason}")]
    ScheduleParse { expression: String, reason: String },

    /// An agent's prompt template could not be rendered.
    #[error("prompt build failed: {0}")]
    PromptBuild(String),

    /// The LLM or peer agent failed while running.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The caller broke the executor contract (e.g. a2a agent without an endpoint).
    #[error("executor contract violated: {0}")]
    Contract(String),

    #[error("agent run timed out after {0}s")]
    Timeout(u64),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CadenceError {
    pub fn schedule(expression: &str, reason: impl std::fmt::Display) -> Self {
        Self::ScheduleParse {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn execution(reason: impl std::fmt::Display) -> Self {
        Self::Execution(reason.to_string())
    }
}

/// Convenience alias used throughout the Cadence crates.
pub type Result<T> = std::result::Result<T, CadenceError>;
