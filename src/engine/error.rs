//! Error types for engine operations.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while constructing or committing engine records.
///
/// Commit rejections (duplicate, subsumed, trivial) are not errors; they are
/// `None` returns on the commit path. These variants cover invariant
/// violations and refusals that callers may want to distinguish.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Assertion or rule invariant violated at construction.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed KIF handed to a parsing front door.
    #[error(transparent)]
    Parse(#[from] crate::kif::ParseError),

    /// KB still over capacity after eviction.
    #[error("knowledge base `{kb}` is full (capacity {capacity})")]
    Capacity { kb: String, capacity: usize },

    /// A support id refers to an assertion the TMS has never seen.
    #[error("unknown support id: {0}")]
    UnknownSupport(Uuid),

    /// Adding the assertion would close a justification cycle.
    #[error("support cycle involving {0}")]
    Cycle(Uuid),

    /// Malformed query or failed goal operator.
    #[error("query error: {0}")]
    Query(String),
}

impl EngineError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }
}
