//! A log persisted as JSON lines.
//!
//! Each line of the file is one [`LogEntry`], in append order across all
//! feeds. The whole file is loaded into an [`InMemoryNetwork`] on open;
//! publishing appends to memory first and then writes the line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use feedgit_types::{EntryId, FeedId, Timestamp};

use crate::entry::LogEntry;
use crate::error::{LogError, LogResult};
use crate::memory::{InMemoryLog, InMemoryNetwork};
use crate::traits::{EntryStream, UpdateLog};

/// A file-backed [`UpdateLog`].
pub struct JsonlLog {
    inner: InMemoryLog,
    path: PathBuf,
    /// Serializes publish so lines land in sequence order.
    write_lock: Mutex<()>,
}

impl JsonlLog {
    /// Open (or create) the log at `path`, publishing as `feed`.
    pub async fn open(path: impl Into<PathBuf>, feed: FeedId, max_entry_size: usize) -> LogResult<Self> {
        let path = path.into();
        let network = InMemoryNetwork::with_max_entry_size(max_entry_size);

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                for (idx, line) in text.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let entry: LogEntry =
                        serde_json::from_str(line).map_err(|e| LogError::Corrupt {
                            line: idx + 1,
                            reason: e.to_string(),
                        })?;
                    network.import(entry).map_err(|e| LogError::Corrupt {
                        line: idx + 1,
                        reason: e.to_string(),
                    })?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(dir) = path.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
            }
            Err(e) => return Err(e.into()),
        }

        info!(path = %path.display(), entries = network.all_entries().len(), "log opened");
        Ok(Self {
            inner: network.log_for(feed),
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn network(&self) -> &InMemoryNetwork {
        self.inner.network()
    }
}

#[async_trait]
impl UpdateLog for JsonlLog {
    async fn publish(&self, content: Value) -> LogResult<LogEntry> {
        let _guard = self.write_lock.lock().await;
        let entry = self.inner.publish(content).await?;

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!(key = %entry.key.short_hex(), "entry persisted");
        Ok(entry)
    }

    async fn replay_history(&self, feed: &FeedId) -> LogResult<EntryStream> {
        self.inner.replay_history(feed).await
    }

    async fn tail(&self, feed: &FeedId, since: Timestamp) -> LogResult<EntryStream> {
        self.inner.tail(feed, since).await
    }

    async fn get(&self, key: &EntryId) -> LogResult<Option<LogEntry>> {
        self.inner.get(key).await
    }

    fn local_feed(&self) -> FeedId {
        self.inner.local_feed()
    }

    fn max_entry_size(&self) -> usize {
        self.inner.max_entry_size()
    }
}
