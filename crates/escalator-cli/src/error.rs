//! Error handling for the escalator CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Escalator error: {0}")]
    Escalator(#[from] escalator_core::EscalatorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{count} configured scope(s) resolve to an invalid config")]
    InvalidScopes { count: usize },

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(format!("{:#}", err))
    }
}
