//! Error types for escalator
//!
//! Two families live here. [`OperationError`] is what a tracked operation
//! stores when it fails, either because the caller reported a failure or
//! because its timeout elapsed. [`EscalatorError`] is returned by the API
//! itself when a call cannot be honored (unknown ids, invalid configuration,
//! malformed payloads).

use std::error::Error as StdError;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Operation Errors
// ----------------------------------------------------------------------------

/// Failure stored on an operation.
///
/// Cancellation is a terminal status of its own and never shows up here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperationError {
    /// Caller-supplied failure described by a message
    #[error("{0}")]
    Message(String),
    /// Caller-supplied failure carrying the original error value
    #[error("{0}")]
    Source(Arc<dyn StdError + Send + Sync>),
    /// Synthesized when the configured timeout elapses before completion
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl OperationError {
    /// Build a failure from a plain message
    pub fn message(message: impl Into<String>) -> Self {
        OperationError::Message(message.into())
    }

    /// Wrap an arbitrary error, keeping the original value reachable
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        OperationError::Source(Arc::new(error))
    }

    /// Whether this failure was synthesized by an elapsed timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, OperationError::Timeout { .. })
    }
}

impl PartialEq for OperationError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OperationError::Message(a), OperationError::Message(b)) => a == b,
            (OperationError::Source(a), OperationError::Source(b)) => Arc::ptr_eq(a, b),
            (
                OperationError::Timeout { duration_ms: a },
                OperationError::Timeout { duration_ms: b },
            ) => a == b,
            _ => false,
        }
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        OperationError::Message(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        OperationError::Message(message.to_string())
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Reasons an escalation config is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("inline threshold ({inline_ms}ms) must be below overlay threshold ({overlay_ms}ms)")]
    InlineNotBelowOverlay { inline_ms: u64, overlay_ms: u64 },
    #[error("overlay threshold ({overlay_ms}ms) must be below modal threshold ({modal_ms}ms)")]
    OverlayNotBelowModal { overlay_ms: u64, modal_ms: u64 },
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Errors returned by the escalator API
#[derive(Debug, thiserror::Error)]
pub enum EscalatorError {
    #[error("Operation {id} is already running")]
    DuplicateOperation { id: String },

    #[error("Operation not found: {id}")]
    OperationNotFound { id: String },

    #[error("Operation {id} already finished with status {status}")]
    OperationFinished { id: String, status: String },

    #[error("Operation {id} is still running")]
    OperationRunning { id: String },

    #[error("Invalid escalation config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel error: {message}")]
    Channel { message: String },
}

/// Result type alias for escalator operations
pub type EscalatorResult<T> = Result<T, EscalatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_names_duration() {
        let err = OperationError::Timeout { duration_ms: 1500 };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("1500"));
    }

    #[test]
    fn caller_errors_are_not_timeouts() {
        let err = OperationError::message("disk full");
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "disk full");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "broken pipe");
        let wrapped = OperationError::from_error(io);
        assert!(!wrapped.is_timeout());
        assert_eq!(wrapped.to_string(), "broken pipe");
    }
}
