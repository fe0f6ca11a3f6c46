//! Error types for Toolgate
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::tools::ExecutionContext;

/// Boxed error produced by a tool body, preserved as the cause of [`ToolgateError::ExecutionFailed`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All error types that can occur in Toolgate
#[derive(Debug, Error)]
pub enum ToolgateError {
    /// Metadata field outside its allowed range or set
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Execution context that cannot be used where it was given
    #[error("Invalid execution context: {0}")]
    InvalidContext(String),

    /// Dispatch attempted while the router is stopped
    #[error("Router not started")]
    NotStarted,

    /// The dispatched tool itself failed
    #[error("Tool '{tool}' failed on {context} context: {source}")]
    ExecutionFailed {
        tool: String,
        context: ExecutionContext,
        #[source]
        source: BoxError,
    },

    /// Metadata catalog could not be loaded
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolgateError {
    /// True for errors raised synchronously at construction or registration time
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidMetadata(_) | Self::InvalidContext(_))
    }
}

/// Result type alias for Toolgate operations
pub type Result<T> = std::result::Result<T, ToolgateError>;
