//! Error types for reference operations.

use thiserror::Error;

use feedgit_types::GitHash;

/// Errors that can occur during reference operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefError {
    /// A proposed update's expected old value does not match the ledger.
    #[error("ref {name} has moved: expected {}, found {}", show(.expected), show(.actual))]
    Conflict {
        name: String,
        expected: Option<GitHash>,
        actual: Option<GitHash>,
    },

    /// The ref name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The same ref appears more than once in one batch.
    #[error("ref updated twice in one batch: {name}")]
    DuplicateUpdate { name: String },
}

fn show(hash: &Option<GitHash>) -> String {
    hash.map_or_else(|| "nothing".to_string(), |h| h.to_hex())
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
