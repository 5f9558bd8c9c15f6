use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use feedgit_index::Probe;
use feedgit_log::UpdateLog;
use feedgit_protocol::{ObjectDescriptor, ObjectMap, PackEntry, UpdateCodec, UpdateMessage};
use feedgit_refs::HeadWait;
use feedgit_store::{BlobReader, BlobStore};
use feedgit_types::{BlobId, EntryId, FeedId, GitHash, MergePolicy, RepoId, Timestamp};

use crate::apply::RepoState;
use crate::cache::ObjectCache;
use crate::config::SyncConfig;
use crate::engine;
use crate::error::{RepoError, RepoResult};
use crate::object::GitObject;
use crate::state::{SyncState, SyncStatus};
use crate::transaction::UpdateTransaction;

/// Identifies one repository: the feed that owns it and its id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RepoHandle {
    pub feed: FeedId,
    pub id: RepoId,
}

/// State shared between a repository's public handles and its sync task.
pub(crate) struct Shared {
    pub(crate) handle: RepoHandle,
    pub(crate) log: Arc<dyn UpdateLog>,
    pub(crate) store: Arc<dyn BlobStore>,
    pub(crate) config: SyncConfig,
    /// Never held across an await.
    state: Mutex<RepoState>,
    cache: Mutex<ObjectCache>,
    status: watch::Sender<SyncStatus>,
    /// Held by a commit from its compare-and-swap through its local apply.
    pub(crate) commit_lock: AsyncMutex<()>,
}

impl Shared {
    pub(crate) fn state_lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().expect("lock poisoned")
    }

    pub(crate) fn apply(
        &self,
        key: EntryId,
        msg: &UpdateMessage,
        policy: MergePolicy,
    ) -> Option<BlobId> {
        self.state_lock().apply(key, msg, policy)
    }

    pub(crate) fn merge_overflow(&self, objects: &ObjectMap, policy: MergePolicy) -> usize {
        self.state_lock().merge_overflow(objects, policy)
    }

    pub(crate) fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.status.borrow().closed
    }

    /// Closed or failed: no more history will arrive.
    fn is_stopped(&self) -> bool {
        let status = self.status.borrow();
        status.closed || status.failure.is_some()
    }

    fn advance(&self, next: SyncState) {
        let mut changed = false;
        self.status.send_if_modified(|s| {
            changed = s.state < next;
            if changed {
                s.state = next;
            }
            changed
        });
        if changed {
            info!(repo = %self.handle.id.short_hex(), state = %next, "sync state advanced");
        }
    }

    pub(crate) fn start_replay(&self) {
        self.advance(SyncState::ReplayingHistory);
    }

    /// History is exhausted: settle HEAD and release ref readers.
    pub(crate) fn refs_synced(&self) {
        {
            let mut state = self.state_lock();
            let RepoState { refs, head, .. } = &mut *state;
            head.apply_default(refs);
        }
        self.advance(SyncState::RefsSynced);
    }

    /// Every overflow blob from history is merged: misses are now final.
    pub(crate) fn fully_synced(&self) {
        let released = self.state_lock().objects.finish_history();
        if released > 0 {
            info!(repo = %self.handle.id.short_hex(), lookups = released, "pending lookups resolved absent");
        }
        self.advance(SyncState::FullySynced);
    }

    pub(crate) fn set_live_tailing(&self, on: bool) {
        self.status.send_if_modified(|s| {
            let changed = s.live_tailing != on && !s.closed;
            if changed {
                s.live_tailing = on;
            }
            changed
        });
    }

    pub(crate) fn record_failure(&self, reason: String) {
        warn!(repo = %self.handle.id.short_hex(), error = %reason, "sync failed");
        // Status first, so a lookup that queues after the waiters below are
        // failed still sees the failure.
        self.status.send_modify(|s| {
            s.failure.get_or_insert_with(|| reason.clone());
            s.live_tailing = false;
        });
        let mut state = self.state_lock();
        state.objects.fail_pending(&reason);
        state.head.abandon_waiters();
    }

    /// The error to report when a wait ended without an answer.
    fn interrupted(&self) -> RepoError {
        let status = self.status.borrow();
        match &status.failure {
            Some(reason) if !status.closed => RepoError::SyncFailed(reason.clone()),
            _ => RepoError::closed(),
        }
    }

    async fn wait_for(&self, target: SyncState) -> RepoResult<SyncStatus> {
        let mut rx = self.status.subscribe();
        let status = rx
            .wait_for(|s| s.reached_or_stopped(target))
            .await
            .map_err(|_| RepoError::closed())?
            .clone();
        if status.state >= target {
            Ok(status)
        } else {
            Err(self.interrupted())
        }
    }
}

/// Aborts the sync task when the last handle clone goes away.
struct EngineTask(Mutex<Option<JoinHandle<()>>>);

impl EngineTask {
    fn abort(&self) {
        if let Some(task) = self.0.lock().expect("lock poisoned").take() {
            task.abort();
        }
    }
}

impl Drop for EngineTask {
    fn drop(&mut self) {
        self.abort();
    }
}

/// An open repository.
///
/// Opening starts a background task that replays the owner's feed and,
/// with [`SyncConfig::live`], keeps following it. Reads made during replay
/// wait for the data they need rather than reporting a premature miss.
/// Cloning yields another handle onto the same state; the sync task stops
/// when every clone is dropped or [`close`](Self::close) is called.
#[derive(Clone)]
pub struct Repository {
    pub(crate) shared: Arc<Shared>,
    engine: Arc<EngineTask>,
}

impl Repository {
    fn new(
        handle: RepoHandle,
        log: Arc<dyn UpdateLog>,
        store: Arc<dyn BlobStore>,
        config: SyncConfig,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::new());
        let cache = ObjectCache::new(config.small_object_cache_bytes);
        Self {
            shared: Arc::new(Shared {
                handle,
                log,
                store,
                config,
                state: Mutex::new(RepoState::default()),
                cache: Mutex::new(cache),
                status,
                commit_lock: AsyncMutex::new(()),
            }),
            engine: Arc::new(EngineTask(Mutex::new(None))),
        }
    }

    fn spawn_engine(&self, since: Timestamp, replay: bool) {
        let task = tokio::spawn(engine::run(self.shared.clone(), since, replay));
        *self.engine.0.lock().expect("lock poisoned") = Some(task);
    }

    /// Open a repository owned by `handle.feed` and start syncing it.
    ///
    /// Must be called within a Tokio runtime.
    pub fn open(
        handle: RepoHandle,
        log: Arc<dyn UpdateLog>,
        store: Arc<dyn BlobStore>,
        config: SyncConfig,
    ) -> Self {
        // Captured before replay starts so the tail misses nothing published
        // while replay runs.
        let since = Timestamp::now();
        let repo = Self::new(handle, log, store, config);
        info!(repo = %handle.id.short_hex(), owner = %handle.feed.short_id(), "opening repository");
        repo.spawn_engine(since, true);
        repo
    }

    pub fn handle(&self) -> RepoHandle {
        self.shared.handle
    }

    pub fn id(&self) -> RepoId {
        self.shared.handle.id
    }

    /// The feed allowed to publish updates.
    pub fn owner(&self) -> FeedId {
        self.shared.handle.feed
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.status()
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Wait until the handle reaches `target`.
    ///
    /// Fails if sync fails or the handle closes first.
    pub async fn wait_for(&self, target: SyncState) -> RepoResult<SyncStatus> {
        self.shared.wait_for(target).await
    }

    // ---- Refs ----

    /// Current refs, waiting for history replay to finish first.
    pub async fn refs(&self) -> RepoResult<Vec<(String, GitHash)>> {
        self.wait_for(SyncState::RefsSynced).await?;
        Ok(self.refs_now())
    }

    /// Refs known right now, possibly incomplete while replaying.
    pub fn refs_now(&self) -> Vec<(String, GitHash)> {
        self.shared.state_lock().refs.current_refs()
    }

    /// The ref HEAD points at. Waits until HEAD is known or replay ends.
    pub async fn head(&self) -> RepoResult<Option<String>> {
        let wait = {
            let mut state = self.shared.state_lock();
            // Checked under the state lock: failure and close update status
            // before they drain waiters.
            if self.shared.is_stopped() && !state.head.is_settled() {
                return Err(self.shared.interrupted());
            }
            state.head.on_resolved()
        };
        match wait {
            HeadWait::Ready(head) => Ok(head),
            HeadWait::Waiting(rx) => rx.await.map_err(|_| self.shared.interrupted()),
        }
    }

    /// Symbolic refs: `HEAD` and its target, if HEAD is set.
    pub async fn symrefs(&self) -> RepoResult<Vec<(String, String)>> {
        Ok(self
            .head()
            .await?
            .map(|target| vec![("HEAD".to_string(), target)])
            .unwrap_or_default())
    }

    /// Start building an update.
    pub fn transaction(&self) -> UpdateTransaction<'_> {
        UpdateTransaction::new(self)
    }

    // ---- Objects ----

    /// Descriptor of an object, waiting while it may still appear in
    /// history. `None` means the object is definitely absent.
    pub async fn object_descriptor(&self, hash: &GitHash) -> RepoResult<Option<ObjectDescriptor>> {
        let lookup = {
            let mut state = self.shared.state_lock();
            if self.shared.is_stopped() && state.objects.probe(hash) == Probe::Unknown {
                return Err(self.shared.interrupted());
            }
            state.objects.lookup(hash)
        };
        Ok(lookup.resolve().await?)
    }

    pub async fn has_object(&self, hash: &GitHash) -> RepoResult<bool> {
        Ok(self.object_descriptor(hash).await?.is_some())
    }

    /// Check for an object without waiting.
    pub fn probe_object(&self, hash: &GitHash) -> Probe {
        self.shared.state_lock().objects.probe(hash)
    }

    /// Number of objects indexed so far.
    pub fn object_count(&self) -> usize {
        self.shared.state_lock().objects.len()
    }

    #[cfg(test)]
    pub(crate) fn queued_waiters(&self) -> (usize, usize) {
        let state = self.shared.state_lock();
        (state.objects.pending_count(), state.head.waiter_count())
    }

    /// Open an object for reading.
    ///
    /// Commit, tree and tag content is cached in memory per handle; blob
    /// content always streams from the store.
    pub async fn get_object(&self, hash: &GitHash) -> RepoResult<GitObject> {
        let desc = self
            .object_descriptor(hash)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("object {hash}")))?;

        let reader: BlobReader = if desc.kind.is_cacheable() && self.cache_enabled() {
            Box::pin(Cursor::new(self.fetch_cached(&desc.link).await?))
        } else {
            self.shared.store.fetch(&desc.link).await?
        };
        Ok(GitObject {
            kind: desc.kind,
            length: desc.length,
            reader,
        })
    }

    /// Read an object's whole payload.
    pub async fn read_object(&self, hash: &GitHash) -> RepoResult<Bytes> {
        self.get_object(hash).await?.into_bytes().await
    }

    fn cache_enabled(&self) -> bool {
        self.shared.cache.lock().expect("lock poisoned").is_enabled()
    }

    async fn fetch_cached(&self, id: &BlobId) -> RepoResult<Bytes> {
        if let Some(hit) = self.shared.cache.lock().expect("lock poisoned").get(id) {
            return Ok(hit);
        }
        let data = self.shared.store.fetch_bytes(id).await?;
        let mut cache = self.shared.cache.lock().expect("lock poisoned");
        cache.insert(*id, data.clone());
        debug!(blob = %id.short_hex(), entries = cache.len(), bytes = cache.used_bytes(), "object cached");
        Ok(data)
    }

    #[cfg(test)]
    pub(crate) fn cached_objects(&self) -> usize {
        self.shared.cache.lock().expect("lock poisoned").len()
    }

    // ---- Packs ----

    /// All packs, live first, waiting for history replay to finish.
    pub async fn packs(&self) -> RepoResult<Vec<PackEntry>> {
        self.wait_for(SyncState::RefsSynced).await?;
        Ok(self.shared.state_lock().packs.all_packs())
    }

    pub async fn get_packfile(&self, id: &BlobId) -> RepoResult<BlobReader> {
        Ok(self.shared.store.fetch(id).await?)
    }

    pub async fn get_pack_index(&self, id: &BlobId) -> RepoResult<BlobReader> {
        Ok(self.shared.store.fetch(id).await?)
    }

    // ---- Lifecycle ----

    /// Stop syncing. Outstanding lookups and HEAD waits fail with
    /// [`RepoError::HandleClosed`]; indexed data stays readable.
    pub fn close(&self) {
        let mut first = false;
        self.shared.status.send_if_modified(|s| {
            first = !s.closed;
            s.closed = true;
            s.live_tailing = false;
            first
        });
        if !first {
            return;
        }
        self.engine.abort();
        let mut state = self.shared.state_lock();
        state.objects.abandon_pending();
        state.head.abandon_waiters();
        info!(repo = %self.shared.handle.id.short_hex(), "repository closed");
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("handle", &self.shared.handle)
            .field("status", &self.shared.status())
            .finish()
    }
}

/// Create a repository owned by the log's local feed.
///
/// The new handle has no history to replay and starts fully synced.
pub async fn create_repo(
    log: Arc<dyn UpdateLog>,
    store: Arc<dyn BlobStore>,
    config: SyncConfig,
) -> RepoResult<Repository> {
    let entry = log.publish(UpdateCodec::repo_record()).await?;
    let handle = RepoHandle {
        feed: entry.author,
        id: RepoId::from(entry.key),
    };
    info!(repo = %handle.id.short_hex(), owner = %handle.feed.short_id(), "repository created");

    let repo = Repository::new(handle, log, store, config);
    repo.shared.refs_synced();
    repo.shared.fully_synced();
    if repo.shared.config.live {
        repo.spawn_engine(entry.timestamp.next(), false);
    }
    Ok(repo)
}

/// Open a repository by id, learning its owner from the creation record.
pub async fn open_repo(
    log: Arc<dyn UpdateLog>,
    store: Arc<dyn BlobStore>,
    id: RepoId,
    config: SyncConfig,
) -> RepoResult<Repository> {
    let entry = log
        .get(&id.creation_entry())
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("repository {id}")))?;
    if !UpdateCodec::is_repo_record(&entry.content) {
        return Err(RepoError::NotFound(format!("{id} is not a repository")));
    }
    let handle = RepoHandle {
        feed: entry.author,
        id,
    };
    Ok(Repository::open(handle, log, store, config))
}
