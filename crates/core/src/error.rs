// Central Error Type for step execution

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum StepError {
    /// Bad or missing input, detected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] crate::port::TransportError),

    /// Failure reported by the remote tool or server, surfaced verbatim
    #[error("{0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event error: {0}")]
    Event(String),

    #[error("Execution interrupted: {0}")]
    Interrupted(#[from] crate::context::ContextError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StepError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StepError::Validation(msg.into())
    }

    /// True when the error means the remote action was never attempted
    pub fn is_launch_failure(&self) -> bool {
        match self {
            StepError::Transport(e) => e.is_launch_failure(),
            _ => false,
        }
    }
}

/// Result type alias using StepError
pub type Result<T> = std::result::Result<T, StepError>;
