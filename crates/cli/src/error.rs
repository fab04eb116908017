//! Error types for CLI operations.

use contracts::{FlowError, PipelineError};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Topology could not be wired
    #[error("Failed to wire topology: {0}")]
    Wiring(#[from] PipelineError),

    /// A supervised task failed
    #[error("Flow execution failed: {0}")]
    Flow(#[from] FlowError),

    /// Run did not finish before its deadline
    #[error("Run exceeded deadline of {secs}s")]
    DeadlineExceeded { secs: u64 },

    /// Run was stopped by a shutdown signal
    #[error("Run interrupted by shutdown signal")]
    Interrupted,

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
