use thiserror::Error;

use feedgit_crypto::HasherError;
use feedgit_index::IndexError;
use feedgit_log::{LogEntry, LogError};
use feedgit_protocol::ProtocolError;
use feedgit_refs::RefError;
use feedgit_store::StoreError;
use feedgit_types::{FeedId, GitHash};

#[derive(Debug, Error)]
pub enum RepoError {
    /// The object, ref, or repository does not exist. Only reported once
    /// history has been fully read.
    #[error("not found: {0}")]
    NotFound(String),

    /// A ref moved since the caller last read it.
    #[error("ref {name} has moved: expected {}, found {}", show(.expected), show(.actual))]
    Conflict {
        name: String,
        expected: Option<GitHash>,
        actual: Option<GitHash>,
    },

    /// The update does not fit in one log entry even with a single inline
    /// object.
    #[error("update too large: {size} bytes exceeds entry limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Only the repository owner may publish updates.
    #[error("{writer} may not write to a repository owned by {owner}")]
    Unauthorized { writer: FeedId, owner: FeedId },

    #[error("invalid ref update: {0}")]
    InvalidRef(String),

    /// Streamed object content disagrees with its declared length.
    #[error("invalid object: {0}")]
    InvalidObject(#[from] HasherError),

    /// Replay or tail failed; the handle serves what it indexed so far.
    #[error("sync failed: {0}")]
    SyncFailed(String),

    /// The handle was closed. If the update had already been accepted by the
    /// log, `published` holds the entry.
    #[error("repository handle closed")]
    HandleClosed { published: Option<Box<LogEntry>> },

    #[error("config error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Whether the error came from the log or blob store rather than from
    /// this repository's own rules.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, Self::Log(_) | Self::Store(_) | Self::Io(_))
    }

    pub(crate) fn closed() -> Self {
        Self::HandleClosed { published: None }
    }
}

impl From<RefError> for RepoError {
    fn from(e: RefError) -> Self {
        match e {
            RefError::Conflict {
                name,
                expected,
                actual,
            } => Self::Conflict {
                name,
                expected,
                actual,
            },
            other => Self::InvalidRef(other.to_string()),
        }
    }
}

impl From<IndexError> for RepoError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::SyncFailed(reason) => Self::SyncFailed(reason),
            IndexError::Abandoned => Self::closed(),
        }
    }
}

fn show(hash: &Option<GitHash>) -> String {
    hash.map_or_else(|| "nothing".to_string(), |h| h.to_hex())
}

pub type RepoResult<T> = Result<T, RepoError>;
