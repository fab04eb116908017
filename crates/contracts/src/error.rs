//! Layered error definitions
//!
//! Categorized by when they surface: construction (topology wiring, config)
//! and runtime (task failures reported to a supervision context).

use thiserror::Error;

use crate::Address;

/// Runtime failure of a supervised task
///
/// Cloned into the supervision context as its terminal error, so it only
/// carries owned, comparable data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Supervision context was cancelled
    #[error("context cancelled")]
    Cancelled,

    /// Send on a stream whose queue has already been closed
    #[error("stream '{address}' is closed")]
    StreamClosed { address: Address },

    /// Addressable dispatch resolved to an inlet that was never bound
    #[error("no inlet bound at address '{address}'")]
    UnresolvedTarget { address: Address },

    /// Task returned an error
    #[error("task '{key}' failed: {message}")]
    Task { key: String, message: String },

    /// Task panicked (recovered or fatal)
    #[error("task '{key}' panicked: {message}")]
    Panicked { key: String, message: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl FlowError {
    /// Create task failure
    pub fn task(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create panic failure
    pub fn panicked(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Panicked {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create closed-stream failure
    pub fn stream_closed(address: impl Into<Address>) -> Self {
        Self::StreamClosed {
            address: address.into(),
        }
    }

    /// Create unresolved-target failure
    pub fn unresolved(address: impl Into<Address>) -> Self {
        Self::UnresolvedTarget {
            address: address.into(),
        }
    }

    /// Create free-form failure
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// True if this error only reports cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Role an address is looked up under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Sink,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Source => f.write_str("source"),
            Role::Sink => f.write_str("sink"),
        }
    }
}

/// Construction-time error
#[derive(Debug, Error)]
pub enum PipelineError {
    // ===== Topology Errors =====
    /// Address not registered under the requested role
    #[error("{role} '{address}' not found in pipeline")]
    AddressNotFound { address: Address, role: Role },

    /// Address registered, but with a different value type
    #[error("{role} '{address}' does not carry values of type {expected}")]
    TypeMismatch {
        address: Address,
        role: Role,
        expected: &'static str,
    },

    /// Router called with an empty source or sink list
    #[error("router has no {role} targets")]
    NoTargets { role: Role },

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create address-not-found error
    pub fn not_found(address: impl Into<Address>, role: Role) -> Self {
        Self::AddressNotFound {
            address: address.into(),
            role,
        }
    }

    /// Create type-mismatch error
    pub fn type_mismatch<V>(address: impl Into<Address>, role: Role) -> Self {
        Self::TypeMismatch {
            address: address.into(),
            role,
            expected: std::any::type_name::<V>(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}
