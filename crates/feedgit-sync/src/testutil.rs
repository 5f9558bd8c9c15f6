//! Log and store wrappers that let tests hold back or break sync.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use feedgit_log::{EntryStream, InMemoryLog, LogEntry, LogError, LogResult, UpdateLog};
use feedgit_store::{BlobReader, BlobStore, InMemoryBlobStore, StoreResult};
use feedgit_types::{BlobId, EntryId, FeedId, GitHash, Timestamp};

/// A gate that starts closed. Each pass through it waits for a permit.
#[derive(Clone)]
pub(crate) struct Gate(Arc<Semaphore>);

impl Gate {
    pub(crate) fn closed() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    pub(crate) fn open(&self) {
        self.0.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    async fn pass(&self) {
        drop(self.0.acquire().await);
    }
}

/// An [`InMemoryLog`] whose history replay is held at a [`Gate`] and can end
/// in an error.
pub(crate) struct GatedLog {
    pub(crate) inner: InMemoryLog,
    pub(crate) gate: Gate,
    pub(crate) fail_replay: bool,
    /// Overrides the limit the log reports, not the one it enforces.
    pub(crate) advertised_max: Option<usize>,
}

impl GatedLog {
    pub(crate) fn new(inner: InMemoryLog) -> Self {
        Self {
            inner,
            gate: Gate::closed(),
            fail_replay: false,
            advertised_max: None,
        }
    }
}

#[async_trait]
impl UpdateLog for GatedLog {
    async fn publish(&self, content: Value) -> LogResult<LogEntry> {
        self.inner.publish(content).await
    }

    async fn replay_history(&self, feed: &FeedId) -> LogResult<EntryStream> {
        let mut upstream = self.inner.replay_history(feed).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = self.gate.clone();
        let fail = self.fail_replay;
        tokio::spawn(async move {
            gate.pass().await;
            while let Some(item) = upstream.recv().await {
                if tx.send(item).is_err() {
                    return;
                }
            }
            if fail {
                let _ = tx.send(Err(LogError::Corrupt {
                    line: 0,
                    reason: "injected".into(),
                }));
            }
        });
        Ok(rx)
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
        self.advertised_max
            .unwrap_or_else(|| self.inner.max_entry_size())
    }
}

/// A shared [`InMemoryBlobStore`] whose reads wait at a [`Gate`].
pub(crate) struct GatedStore {
    pub(crate) inner: Arc<InMemoryBlobStore>,
    pub(crate) gate: Gate,
}

#[async_trait]
impl BlobStore for GatedStore {
    async fn store(&self, data: Bytes) -> StoreResult<BlobId> {
        self.inner.store(data).await
    }

    async fn fetch(&self, id: &BlobId) -> StoreResult<BlobReader> {
        self.gate.pass().await;
        self.inner.fetch(id).await
    }

    async fn exists(&self, id: &BlobId) -> StoreResult<bool> {
        self.inner.exists(id).await
    }
}

pub(crate) fn hash(byte: u8) -> GitHash {
    GitHash::from_bytes([byte; 20])
}

/// Poll `check` until it holds, giving up after about two seconds.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
