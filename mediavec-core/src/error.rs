//! Error types for mediavec operations.

use thiserror::Error;

/// Result type alias using mediavec's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during mediavec operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown or unavailable embedding provider, or an invalid configuration value.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The embedding provider could not produce a vector.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// RPN filter expression could not be parsed.
    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    /// Persisted index payload is unreadable or belongs to another namespace.
    #[error("storage corruption: {0}")]
    StorageCorruption(String),

    /// Vector dimension mismatch between namespace and input.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Caller passed an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not valid in the handle's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// IO error during storage or scan operations.
    #[error("io error: {0}")]
    IoError(String),
}

impl Error {
    /// Wraps any provider-side failure as [`Error::EmbeddingUnavailable`],
    /// keeping an existing one untouched.
    pub(crate) fn into_embedding_unavailable(self) -> Self {
        match self {
            err @ Error::EmbeddingUnavailable(_) => err,
            other => Error::EmbeddingUnavailable(other.to_string()),
        }
    }
}
