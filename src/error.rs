//! Store error types
//!
//! Defines all errors that can occur across the store: eager argument
//! validation, lookup failures, and illegal-state conditions. Precondition
//! violations are always raised before any state is touched.

use thiserror::Error;

/// Errors that can occur in the temporal store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid argument detected before any mutation (inverted range,
    /// zero-width period, malformed batch)
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),

    /// Requested branch does not exist
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// Requested secondary index does not exist
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Branch name is already taken
    #[error("Branch already exists: {0}")]
    BranchExists(String),

    /// Branching timestamp exceeds the parent's head
    #[error("Invalid branching timestamp {timestamp} (parent '{parent}' head is {head})")]
    InvalidTimestamp {
        timestamp: u64,
        parent: String,
        head: u64,
    },

    /// Operation reached a state it must never be in (mixed index value
    /// types, querying a dirty index, zero-width validity period)
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Serialization/deserialization failed at the store boundary
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Lock acquisition failed (poisoned)
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
