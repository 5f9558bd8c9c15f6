use thiserror::Error;

/// Errors delivered to a pending object lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Replay failed before the object could be found or ruled out.
    #[error("sync failed before lookup resolved: {0}")]
    SyncFailed(String),

    /// The index was dropped or closed with the lookup outstanding.
    #[error("lookup abandoned")]
    Abandoned,
}

pub type IndexResult<T> = Result<T, IndexError>;
