use feedgit_types::EntryId;

/// Errors produced by log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The encoded content exceeds the log's per-entry limit.
    #[error("entry too large: {size} bytes exceeds limit of {max}")]
    EntryTooLarge { size: usize, max: usize },

    /// No entry with this id has been published.
    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),

    /// Content could not be encoded or a stored record could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A persisted log file is malformed.
    #[error("corrupt log at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    /// The stored id of an entry does not match its contents.
    #[error("entry {0} fails integrity check")]
    IntegrityViolation(EntryId),

    /// The log has stopped serving this subscription.
    #[error("log stream closed")]
    StreamClosed,

    /// I/O error from a persistent backend.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the log crate.
pub type LogResult<T> = Result<T, LogError>;
