use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use feedgit_types::{EntryId, FeedId, Timestamp};

use crate::entry::LogEntry;
use crate::error::{LogError, LogResult};
use crate::traits::{EntryStream, UpdateLog};
use crate::DEFAULT_MAX_ENTRY_SIZE;

/// A live tail subscription on one feed.
struct Subscriber {
    feed: FeedId,
    sender: mpsc::UnboundedSender<LogResult<LogEntry>>,
}

#[derive(Default)]
struct NetworkState {
    feeds: HashMap<FeedId, Vec<LogEntry>>,
    by_key: HashMap<EntryId, (FeedId, usize)>,
    /// Every entry key in the order it was appended, across feeds.
    order: Vec<EntryId>,
    last_timestamp: Option<Timestamp>,
    subscribers: Vec<Subscriber>,
}

impl NetworkState {
    fn next_timestamp(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let ts = match self.last_timestamp {
            Some(last) if !now.is_after(&last) => last.next(),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn push(&mut self, entry: LogEntry) {
        let entries = self.feeds.entry(entry.author).or_default();
        self.by_key
            .insert(entry.key, (entry.author, entries.len()));
        self.order.push(entry.key);
        entries.push(entry.clone());

        // Fan out, pruning subscribers whose receivers are gone.
        self.subscribers.retain(|sub| {
            if sub.feed == entry.author {
                sub.sender.send(Ok(entry.clone())).is_ok()
            } else {
                !sub.sender.is_closed()
            }
        });
    }
}

struct NetworkInner {
    state: RwLock<NetworkState>,
    max_entry_size: usize,
}

/// A set of feeds shared in one process.
///
/// Cloning is cheap and yields a handle to the same network. Each
/// participant gets an [`InMemoryLog`] bound to their own feed via
/// [`log_for`](Self::log_for); every log sees every feed.
#[derive(Clone)]
pub struct InMemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::with_max_entry_size(DEFAULT_MAX_ENTRY_SIZE)
    }

    /// Create a network whose logs reject content larger than `max` bytes.
    pub fn with_max_entry_size(max: usize) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                state: RwLock::new(NetworkState::default()),
                max_entry_size: max,
            }),
        }
    }

    /// A log publishing to `feed`.
    pub fn log_for(&self, feed: FeedId) -> InMemoryLog {
        InMemoryLog {
            network: self.clone(),
            feed,
        }
    }

    pub fn max_entry_size(&self) -> usize {
        self.inner.max_entry_size
    }

    /// Append `content` to `feed`, stamping the next sequence and timestamp.
    pub fn append(&self, feed: FeedId, content: Value) -> LogResult<LogEntry> {
        let size = serde_json::to_vec(&content)?.len();
        if size > self.inner.max_entry_size {
            return Err(LogError::EntryTooLarge {
                size,
                max: self.inner.max_entry_size,
            });
        }

        let mut state = self.inner.state.write().expect("lock poisoned");
        let sequence = state.feeds.get(&feed).map_or(0, Vec::len) as u64 + 1;
        let timestamp = state.next_timestamp();
        let entry = LogEntry::new(feed, sequence, timestamp, content)?;
        state.push(entry.clone());
        drop(state);

        debug!(feed = %feed.short_id(), seq = sequence, key = %entry.key.short_hex(), "entry appended");
        Ok(entry)
    }

    /// Insert an entry produced elsewhere (e.g. read back from disk).
    ///
    /// The entry's key must verify and its sequence must directly follow the
    /// feed's current last entry. Re-inserting a known key is a no-op.
    pub fn import(&self, entry: LogEntry) -> LogResult<()> {
        if !entry.verify_key() {
            return Err(LogError::IntegrityViolation(entry.key));
        }
        let mut state = self.inner.state.write().expect("lock poisoned");
        if state.by_key.contains_key(&entry.key) {
            return Ok(());
        }
        let expected = state.feeds.get(&entry.author).map_or(0, Vec::len) as u64 + 1;
        if entry.sequence != expected {
            return Err(LogError::Serialization(format!(
                "entry {} has sequence {}, expected {}",
                entry.key, entry.sequence, expected
            )));
        }
        if state
            .last_timestamp
            .map_or(true, |last| entry.timestamp.is_after(&last))
        {
            state.last_timestamp = Some(entry.timestamp);
        }
        state.push(entry);
        Ok(())
    }

    /// All entries on `feed`, oldest first.
    pub fn entries(&self, feed: &FeedId) -> Vec<LogEntry> {
        let state = self.inner.state.read().expect("lock poisoned");
        state.feeds.get(feed).cloned().unwrap_or_default()
    }

    /// Every entry on the network, in the order it was appended.
    pub fn all_entries(&self) -> Vec<LogEntry> {
        let state = self.inner.state.read().expect("lock poisoned");
        state
            .order
            .iter()
            .filter_map(|key| {
                let (feed, idx) = state.by_key.get(key)?;
                state.feeds.get(feed)?.get(*idx).cloned()
            })
            .collect()
    }

    pub fn lookup(&self, key: &EntryId) -> Option<LogEntry> {
        let state = self.inner.state.read().expect("lock poisoned");
        let (feed, idx) = state.by_key.get(key)?;
        state.feeds.get(feed)?.get(*idx).cloned()
    }

    /// Number of entries on `feed`.
    pub fn feed_len(&self, feed: &FeedId) -> usize {
        let state = self.inner.state.read().expect("lock poisoned");
        state.feeds.get(feed).map_or(0, Vec::len)
    }

    /// Number of open tail subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let state = self.inner.state.read().expect("lock poisoned");
        state
            .subscribers
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }

    fn replay(&self, feed: &FeedId) -> EntryStream {
        let (tx, rx) = mpsc::unbounded_channel();
        for entry in self.entries(feed).into_iter().rev() {
            // The receiver is still held by us here, so sends cannot fail.
            let _ = tx.send(Ok(entry));
        }
        rx
    }

    fn subscribe(&self, feed: FeedId, since: Timestamp) -> EntryStream {
        let (tx, rx) = mpsc::unbounded_channel();
        // Backlog and registration happen under one lock so no append can
        // fall between them.
        let mut state = self.inner.state.write().expect("lock poisoned");
        if let Some(entries) = state.feeds.get(&feed) {
            for entry in entries.iter().filter(|e| e.timestamp >= since) {
                let _ = tx.send(Ok(entry.clone()));
            }
        }
        state.subscribers.push(Subscriber { feed, sender: tx });
        rx
    }
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read().expect("lock poisoned");
        f.debug_struct("InMemoryNetwork")
            .field("feeds", &state.feeds.len())
            .field("entries", &state.order.len())
            .field("max_entry_size", &self.inner.max_entry_size)
            .finish()
    }
}

/// One participant's view of an [`InMemoryNetwork`].
#[derive(Clone, Debug)]
pub struct InMemoryLog {
    network: InMemoryNetwork,
    feed: FeedId,
}

impl InMemoryLog {
    /// A fresh network with a single random local feed.
    pub fn ephemeral() -> Self {
        InMemoryNetwork::new().log_for(FeedId::ephemeral())
    }

    pub fn network(&self) -> &InMemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl UpdateLog for InMemoryLog {
    async fn publish(&self, content: Value) -> LogResult<LogEntry> {
        self.network.append(self.feed, content)
    }

    async fn replay_history(&self, feed: &FeedId) -> LogResult<EntryStream> {
        Ok(self.network.replay(feed))
    }

    async fn tail(&self, feed: &FeedId, since: Timestamp) -> LogResult<EntryStream> {
        Ok(self.network.subscribe(*feed, since))
    }

    async fn get(&self, key: &EntryId) -> LogResult<Option<LogEntry>> {
        Ok(self.network.lookup(key))
    }

    fn local_feed(&self) -> FeedId {
        self.feed
    }

    fn max_entry_size(&self) -> usize {
        self.network.max_entry_size()
    }
}
