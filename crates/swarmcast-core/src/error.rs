//! Error types for Swarmcast core

use thiserror::Error;

/// Errors produced while talking to the download engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Engine returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Engine error: {message} (Code: {code})")]
    Protocol { code: i64, message: String },

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Orchestrator is shut down")]
    ShutDown,
}

impl EngineError {
    /// Transport failures: the request never produced a JSON-RPC answer
    pub fn is_transport(&self) -> bool {
        matches!(self, EngineError::Network(_) | EngineError::HttpStatus { .. })
    }

    /// Check if this error is worth polling again for
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Network(_) => true,
            EngineError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors produced by the peer tracker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("Invalid announce: {0}")]
    Validation(String),
}
