//! Error types for DCOPForge

use thiserror::Error;

/// Main error type for DCOPForge operations
#[derive(Debug, Error)]
pub enum DcopError {
    /// Malformed problem, agent or run configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Pipe or socket failure toward a single peer
    #[error("Transport error with {peer}: {reason}")]
    Transport { peer: String, reason: String },

    /// Message received out of the expected protocol order
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Local protocol state contradicts a received message
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    /// Invalid operation for the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DcopError {
    /// Builds a transport error for `peer`.
    pub fn transport(peer: impl ToString, reason: impl ToString) -> Self {
        DcopError::Transport {
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error only invalidates the message that caused it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DcopError::ProtocolViolation(_))
    }
}

/// Result type alias for DCOPForge operations
pub type Result<T> = std::result::Result<T, DcopError>;
