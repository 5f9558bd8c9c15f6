use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use feedgit_types::{EntryId, FeedId, Timestamp};

use crate::entry::LogEntry;
use crate::error::LogResult;

/// A stream of log entries. The stream ends when the sender side is dropped;
/// an `Err` item is terminal.
pub type EntryStream = mpsc::UnboundedReceiver<LogResult<LogEntry>>;

/// The append-only log a repository is derived from.
///
/// Implementations are bound to one local feed that [`publish`](Self::publish)
/// appends to, but can replay and tail any feed they know of.
#[async_trait]
pub trait UpdateLog: Send + Sync {
    /// Append `content` to the local feed.
    ///
    /// Fails with [`LogError::EntryTooLarge`](crate::LogError::EntryTooLarge)
    /// if the encoded content exceeds [`max_entry_size`](Self::max_entry_size).
    async fn publish(&self, content: Value) -> LogResult<LogEntry>;

    /// All entries currently on `feed`, newest first. The stream ends once
    /// the oldest entry has been delivered.
    async fn replay_history(&self, feed: &FeedId) -> LogResult<EntryStream>;

    /// Entries on `feed` with a timestamp at or after `since`, oldest first,
    /// followed by each entry published afterwards. Runs until dropped.
    async fn tail(&self, feed: &FeedId, since: Timestamp) -> LogResult<EntryStream>;

    /// Look up a single entry by key.
    async fn get(&self, key: &EntryId) -> LogResult<Option<LogEntry>>;

    /// The feed this log publishes to.
    fn local_feed(&self) -> FeedId;

    /// Maximum encoded content size accepted by `publish`.
    fn max_entry_size(&self) -> usize;
}
