// Domain Error Types
// Failures reported by the remote tool or server itself

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Structured error message reported by the remote side
    #[error("{0}")]
    Remote(String),

    #[error("command '{command}' exited with status {code}")]
    ExitStatus { code: i32, command: String },

    #[error("command '{command}' was terminated by a signal")]
    Terminated { command: String },
}

impl DomainError {
    pub fn remote(msg: impl Into<String>) -> Self {
        DomainError::Remote(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
