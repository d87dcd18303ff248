//! Error types for Strata

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    /// Vectorization failed or timed out
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// An operation referenced a record that does not exist
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// Canonical set and tier membership diverged. This is a bug, not an
    /// operational failure, and must never be swallowed.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Caller supplied an argument outside its domain
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A cluster merge could not be built or committed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StrataError {
    /// True for the programming-error class that callers must not retry.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, StrataError::InvariantViolation(_))
    }
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
