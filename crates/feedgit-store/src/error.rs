use feedgit_types::BlobId;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob is not held by the store.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// The blob is known but could not be obtained (e.g. no peer has it).
    #[error("blob unavailable: {id}: {reason}")]
    Unavailable { id: BlobId, reason: String },

    /// Stored content does not hash to its id (data corruption).
    #[error("digest mismatch for {id}: content hashes to {computed}")]
    DigestMismatch { id: BlobId, computed: BlobId },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
