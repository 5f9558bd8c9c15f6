//! Building and publishing repository updates.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use feedgit_crypto::ObjectHasher;
use feedgit_log::{LogEntry, LogError};
use feedgit_protocol::{ObjectDescriptor, ObjectMap, PackEntry, UpdateCodec, UpdateMessage};
use feedgit_refs::{validate_ref_name, RefOp};
use feedgit_store::{BlobReader, BlobStore, StoreError};
use feedgit_types::{BlobId, GitHash, MergePolicy};

use crate::error::{RepoError, RepoResult};
use crate::object::{capacity_hint, ObjectSource, PackSource};
use crate::repository::{Repository, Shared};
use crate::state::SyncState;

const READ_CHUNK: usize = 8 * 1024;

/// Stand-in for the overflow blob id while measuring a message; encodes to
/// the same length as a real id.
const PLACEHOLDER_BLOB: BlobId = BlobId::from_hash([0; 32]);

/// A batch of ref changes, objects and packs published as one log entry.
///
/// Nothing is published until [`commit`](Self::commit). Ref changes are
/// compare-and-swap: if any ref moved since the caller read it the whole
/// batch is rejected before anything is uploaded.
#[must_use = "a transaction does nothing until committed"]
pub struct UpdateTransaction<'a> {
    repo: &'a Repository,
    ref_ops: Vec<RefOp>,
    objects: Vec<ObjectSource>,
    packs: Vec<PackSource>,
    head: Option<String>,
}

impl<'a> UpdateTransaction<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            ref_ops: Vec::new(),
            objects: Vec::new(),
            packs: Vec::new(),
            head: None,
        }
    }

    pub fn update_ref(mut self, op: RefOp) -> Self {
        self.ref_ops.push(op);
        self
    }

    pub fn update_refs(mut self, ops: impl IntoIterator<Item = RefOp>) -> Self {
        self.ref_ops.extend(ops);
        self
    }

    pub fn add_object(mut self, object: ObjectSource) -> Self {
        self.objects.push(object);
        self
    }

    pub fn add_objects(mut self, objects: impl IntoIterator<Item = ObjectSource>) -> Self {
        self.objects.extend(objects);
        self
    }

    pub fn add_pack(mut self, pack: PackSource) -> Self {
        self.packs.push(pack);
        self
    }

    /// Point HEAD at `name`.
    pub fn set_head(mut self, name: impl Into<String>) -> Self {
        self.head = Some(name.into());
        self
    }

    /// Upload content and publish the update.
    ///
    /// Returns the published entry, or `None` if the transaction was empty.
    /// Once published, the update is applied to this handle before
    /// returning, so reads see it immediately.
    pub async fn commit(self) -> RepoResult<Option<LogEntry>> {
        let shared = &self.repo.shared;

        let writer = shared.log.local_feed();
        if writer != shared.handle.feed {
            return Err(RepoError::Unauthorized {
                writer,
                owner: shared.handle.feed,
            });
        }
        if let Some(head) = &self.head {
            validate_ref_name(head)?;
        }

        // One commit at a time per handle, from the CAS until the result is
        // applied locally; otherwise two commits can check against the same
        // refs and both publish.
        let serialized = shared.commit_lock.lock().await;
        if shared.is_closed() {
            return Err(RepoError::closed());
        }

        // CAS against settled refs only.
        self.repo.wait_for(SyncState::RefsSynced).await?;
        let refs = if self.ref_ops.is_empty() {
            None
        } else {
            Some(
                shared
                    .state_lock()
                    .refs
                    .propose_updates(&self.ref_ops)?,
            )
        };

        let concurrency = shared.config.object_concurrency.max(1);
        let objects = upload_objects(shared, self.objects, concurrency).await?;
        let packs = upload_packs(shared, self.packs, concurrency).await?;

        let mut msg = UpdateMessage::new(shared.handle.id);
        msg.refs = refs;
        msg.packs = packs;
        msg.head = self.head;
        if msg.is_empty() && objects.is_empty() {
            return Ok(None);
        }

        let (entry, msg, spilled) = publish_batched(shared, msg, objects).await?;

        // The log has accepted the entry; it is real whether or not this
        // handle is still open.
        shared.apply(entry.key, &msg, MergePolicy::Overwrite);
        shared.merge_overflow(&spilled, MergePolicy::Overwrite);
        drop(serialized);
        info!(
            repo = %shared.handle.id.short_hex(),
            entry = %entry.key.short_hex(),
            inline = msg.objects.len(),
            spilled = spilled.len(),
            "update published"
        );

        if shared.is_closed() {
            return Err(RepoError::HandleClosed {
                published: Some(Box::new(entry)),
            });
        }
        Ok(Some(entry))
    }
}

/// Hash and store every object, at most `concurrency` at a time.
async fn upload_objects(
    shared: &Shared,
    sources: Vec<ObjectSource>,
    concurrency: usize,
) -> RepoResult<ObjectMap> {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    for source in sources {
        let store = shared.store.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| RepoError::closed())?;
            upload_object(store.as_ref(), source).await
        });
    }

    let mut objects = ObjectMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (hash, desc) = joined.map_err(|e| RepoError::SyncFailed(e.to_string()))??;
        objects.insert(hash, desc);
    }
    debug!(count = objects.len(), "objects uploaded");
    Ok(objects)
}

/// Stream one object through both digests, then store it under the storage
/// digest.
async fn upload_object(
    store: &dyn BlobStore,
    mut source: ObjectSource,
) -> RepoResult<(GitHash, ObjectDescriptor)> {
    let mut hasher = ObjectHasher::new(source.kind, source.length);
    let mut content = Vec::with_capacity(capacity_hint(source.length));
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = source.content.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
        content.extend_from_slice(&chunk[..n]);
    }
    let (hash, digest) = hasher.finish()?;

    let link = store.store(Bytes::from(content)).await?;
    if link != digest {
        return Err(StoreError::DigestMismatch {
            id: digest,
            computed: link,
        }
        .into());
    }
    Ok((
        hash,
        ObjectDescriptor {
            kind: source.kind,
            length: source.length,
            link,
        },
    ))
}

/// Store every pack and index, keeping the caller's order.
async fn upload_packs(
    shared: &Shared,
    sources: Vec<PackSource>,
    concurrency: usize,
) -> RepoResult<Vec<PackEntry>> {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    for (position, source) in sources.into_iter().enumerate() {
        let store = shared.store.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| RepoError::closed())?;
            let pack = store_stream(store.as_ref(), source.pack).await?;
            let index = match source.index {
                Some(reader) => Some(store_stream(store.as_ref(), reader).await?),
                None => None,
            };
            RepoResult::Ok((position, PackEntry { pack, index }))
        });
    }

    let mut packs = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        packs.push(joined.map_err(|e| RepoError::SyncFailed(e.to_string()))??);
    }
    packs.sort_by_key(|(position, _)| *position);
    Ok(packs.into_iter().map(|(_, entry)| entry).collect())
}

async fn store_stream(store: &dyn BlobStore, mut reader: BlobReader) -> RepoResult<BlobId> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    Ok(store.store(Bytes::from(data)).await?)
}

/// Publish `base` plus `objects`, spilling objects to an overflow blob until
/// the entry fits.
///
/// Starts with every object inline and halves the inline count each time the
/// entry is too large, either by local measurement or because the log
/// rejected it. Gives up once a single inline object does not fit. Returns
/// the entry, the message as published and the spilled objects.
async fn publish_batched(
    shared: &Shared,
    base: UpdateMessage,
    objects: ObjectMap,
) -> RepoResult<(LogEntry, UpdateMessage, ObjectMap)> {
    let max = shared.config.max_entry_size.min(shared.log.max_entry_size());
    let all: Vec<(GitHash, ObjectDescriptor)> = objects.into_iter().collect();
    let mut inline = all.len();

    loop {
        let mut msg = base.clone();
        msg.objects = all[..inline].iter().copied().collect();
        let spilled: ObjectMap = all[inline..].iter().copied().collect();
        if !spilled.is_empty() {
            msg.objects_external_ref = Some(PLACEHOLDER_BLOB);
        }

        let size = UpdateCodec::encoded_len(&msg)?;
        if size <= max {
            if !spilled.is_empty() {
                let blob = Bytes::from(UpdateCodec::encode_object_map(&spilled)?);
                msg.objects_external_ref = Some(shared.store.store(blob).await?);
            }
            match shared.log.publish(UpdateCodec::encode(&msg)?).await {
                Ok(entry) => return Ok((entry, msg, spilled)),
                Err(LogError::EntryTooLarge { size, max }) => {
                    if inline <= 1 {
                        return Err(RepoError::PayloadTooLarge { size, max });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        } else if inline <= 1 {
            return Err(RepoError::PayloadTooLarge { size, max });
        }

        inline /= 2;
        debug!(inline, spilled = all.len() - inline, "update too large, spilling objects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgit_crypto::{git_hash, storage_digest};
    use feedgit_log::{InMemoryLog, InMemoryNetwork, UpdateLog};
    use feedgit_store::InMemoryBlobStore;
    use feedgit_types::{EntryId, FeedId, ObjectKind, RepoId};

    use crate::config::SyncConfig;
    use crate::repository::{create_repo, open_repo};
    use crate::testutil::{hash, GatedLog};

    fn contents(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("object {i}").into_bytes()).collect()
    }

    fn sources(data: &[Vec<u8>]) -> Vec<ObjectSource> {
        data.iter()
            .map(|d| ObjectSource::from_bytes(ObjectKind::Blob, d.clone()))
            .collect()
    }

    /// Encoded size of an update carrying the first `inline` objects by hash
    /// order plus an overflow reference.
    fn size_with_inline(data: &[Vec<u8>], inline: usize) -> usize {
        let objects: ObjectMap = data
            .iter()
            .map(|d| {
                let desc = ObjectDescriptor {
                    kind: ObjectKind::Blob,
                    length: d.len() as u64,
                    link: storage_digest(d),
                };
                (git_hash(ObjectKind::Blob, d), desc)
            })
            .collect();
        let mut msg = UpdateMessage::new(RepoId::new(EntryId::from_hash([0; 32])));
        msg.objects = objects.into_iter().take(inline).collect();
        msg.objects_external_ref = Some(PLACEHOLDER_BLOB);
        UpdateCodec::encoded_len(&msg).unwrap()
    }

    async fn assert_spilled(
        entry: &LogEntry,
        store: &InMemoryBlobStore,
        inline: usize,
        spilled: usize,
    ) {
        let msg = UpdateCodec::decode(&entry.content).unwrap();
        assert_eq!(msg.objects.len(), inline);
        let overflow = msg.objects_external_ref.expect("overflow blob");
        let bytes = store.fetch_bytes(&overflow).await.unwrap();
        let objects = UpdateCodec::decode_object_map(&bytes).unwrap();
        assert_eq!(objects.len(), spilled);
        assert!(objects.keys().all(|h| !msg.objects.contains_key(h)));
    }

    async fn assert_all_visible(repo: &Repository, data: &[Vec<u8>]) {
        repo.wait_for(SyncState::FullySynced).await.unwrap();
        assert_eq!(repo.object_count(), data.len());
        for d in data {
            assert!(repo.has_object(&git_hash(ObjectKind::Blob, d)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn oversized_update_spills_by_measurement() {
        let data = contents(1000);
        let limit = size_with_inline(&data, 400);
        let network = InMemoryNetwork::with_max_entry_size(1 << 20);
        let log = Arc::new(network.log_for(FeedId::ephemeral()));
        let store = Arc::new(InMemoryBlobStore::new());
        let config = SyncConfig {
            max_entry_size: limit,
            ..SyncConfig::default()
        };
        let repo = create_repo(log.clone(), store.clone(), config).await.unwrap();

        let entry = repo
            .transaction()
            .add_objects(sources(&data))
            .commit()
            .await
            .unwrap()
            .expect("published");
        assert!(serde_json::to_vec(&entry.content).unwrap().len() <= limit);
        assert_spilled(&entry, &store, 250, 750).await;
        assert_all_visible(&repo, &data).await;

        let reopened = open_repo(log, store, repo.id(), SyncConfig::default())
            .await
            .unwrap();
        assert_all_visible(&reopened, &data).await;
    }

    #[tokio::test]
    async fn oversized_update_spills_when_log_rejects() {
        let data = contents(1000);
        let limit = size_with_inline(&data, 400);
        let network = InMemoryNetwork::with_max_entry_size(limit);
        let feed = FeedId::ephemeral();
        // Claims no limit, so only the log's rejection drives spilling.
        let mut lying = GatedLog::new(network.log_for(feed));
        lying.advertised_max = Some(usize::MAX);
        let store = Arc::new(InMemoryBlobStore::new());
        let config = SyncConfig {
            max_entry_size: usize::MAX,
            ..SyncConfig::default()
        };
        let repo = create_repo(Arc::new(lying), store.clone(), config)
            .await
            .unwrap();

        let entry = repo
            .transaction()
            .add_objects(sources(&data))
            .commit()
            .await
            .unwrap()
            .expect("published");
        assert_spilled(&entry, &store, 250, 750).await;
        assert_eq!(network.feed_len(&feed), 2);

        let reopened = open_repo(
            Arc::new(network.log_for(feed)),
            store,
            repo.id(),
            SyncConfig::default(),
        )
        .await
        .unwrap();
        assert_all_visible(&reopened, &data).await;
    }

    #[tokio::test]
    async fn single_object_too_large() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let config = SyncConfig {
            max_entry_size: 64,
            ..SyncConfig::default()
        };
        let repo = create_repo(log.clone(), Arc::new(InMemoryBlobStore::new()), config)
            .await
            .unwrap();

        let err = repo
            .transaction()
            .add_object(ObjectSource::from_bytes(ObjectKind::Blob, &b"big"[..]))
            .commit()
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::PayloadTooLarge { max: 64, .. }));
        assert_eq!(log.network().feed_len(&log.local_feed()), 1);
    }

    #[tokio::test]
    async fn conflicting_update_publishes_nothing() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let store = Arc::new(InMemoryBlobStore::new());
        let repo = create_repo(log.clone(), store.clone(), SyncConfig::default())
            .await
            .unwrap();
        repo.transaction()
            .update_ref(RefOp::create("refs/heads/master", hash(1)))
            .commit()
            .await
            .unwrap();
        let published = log.network().feed_len(&log.local_feed());
        let stored = store.len();

        let err = repo
            .transaction()
            .update_refs([
                RefOp::create("refs/heads/feature", hash(3)),
                RefOp::new("refs/heads/master", Some(hash(2)), Some(hash(4))),
            ])
            .add_object(ObjectSource::from_bytes(ObjectKind::Blob, &b"unused"[..]))
            .commit()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Conflict { ref name, expected: Some(e), actual: Some(a) }
                if name == "refs/heads/master" && e == hash(2) && a == hash(1)
        ));
        assert_eq!(log.network().feed_len(&log.local_feed()), published);
        assert_eq!(store.len(), stored);
        assert_eq!(
            repo.refs().await.unwrap(),
            vec![("refs/heads/master".to_string(), hash(1))]
        );
    }

    #[tokio::test]
    async fn concurrent_commits_on_one_handle_serialize() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let store = Arc::new(InMemoryBlobStore::new());
        let repo = create_repo(log.clone(), store, SyncConfig::default())
            .await
            .unwrap();
        let before = log.network().feed_len(&log.local_feed());
        let big = |fill: u8| ObjectSource::from_bytes(ObjectKind::Blob, vec![fill; 200 * 1024]);

        let (first, second) = tokio::join!(
            repo.transaction()
                .update_ref(RefOp::create("refs/heads/master", hash(1)))
                .add_object(big(1))
                .commit(),
            repo.transaction()
                .update_ref(RefOp::create("refs/heads/master", hash(2)))
                .add_object(big(2))
                .commit(),
        );

        let (won, lost) = match (first, second) {
            (Ok(Some(_)), Err(e)) => (hash(1), e),
            (Err(e), Ok(Some(_))) => (hash(2), e),
            other => panic!("expected exactly one commit to succeed: {other:?}"),
        };
        assert!(matches!(
            lost,
            RepoError::Conflict { ref name, expected: None, actual: Some(a) }
                if name == "refs/heads/master" && a == won
        ));
        assert_eq!(log.network().feed_len(&log.local_feed()), before + 1);
        assert_eq!(
            repo.refs().await.unwrap(),
            vec![("refs/heads/master".to_string(), won)]
        );
    }

    #[tokio::test]
    async fn creating_an_existing_ref_conflicts() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let repo = create_repo(log, Arc::new(InMemoryBlobStore::new()), SyncConfig::default())
            .await
            .unwrap();
        repo.transaction()
            .update_ref(RefOp::create("refs/heads/master", hash(1)))
            .commit()
            .await
            .unwrap();
        let err = repo
            .transaction()
            .update_ref(RefOp::create("refs/heads/master", hash(2)))
            .commit()
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict { expected: None, .. }));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let repo = create_repo(log.clone(), Arc::new(InMemoryBlobStore::new()), SyncConfig::default())
            .await
            .unwrap();

        let err = repo
            .transaction()
            .update_ref(RefOp::create("master", hash(1)))
            .commit()
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidRef(_)));

        let err = repo.transaction().set_head("HEAD").commit().await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidRef(_)));
        assert_eq!(log.network().feed_len(&log.local_feed()), 1);
    }

    #[tokio::test]
    async fn empty_transaction_is_a_noop() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let repo = create_repo(log.clone(), Arc::new(InMemoryBlobStore::new()), SyncConfig::default())
            .await
            .unwrap();
        assert!(repo.transaction().commit().await.unwrap().is_none());
        assert_eq!(log.network().feed_len(&log.local_feed()), 1);
    }

    #[tokio::test]
    async fn only_the_owner_may_write() {
        let network = InMemoryNetwork::new();
        let owner = Arc::new(network.log_for(FeedId::ephemeral()));
        let other = Arc::new(network.log_for(FeedId::ephemeral()));
        let store = Arc::new(InMemoryBlobStore::new());
        let repo = create_repo(owner.clone(), store.clone(), SyncConfig::default())
            .await
            .unwrap();
        let foreign = open_repo(other.clone(), store, repo.id(), SyncConfig::default())
            .await
            .unwrap();

        let err = foreign
            .transaction()
            .update_ref(RefOp::create("refs/heads/master", hash(1)))
            .commit()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Unauthorized { writer, owner: o } if writer == other.local_feed() && o == owner.local_feed()
        ));
        assert_eq!(network.feed_len(&owner.local_feed()), 1);
        assert_eq!(network.feed_len(&other.local_feed()), 0);
    }

    #[tokio::test]
    async fn declared_length_must_match_content() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let repo = create_repo(log, Arc::new(InMemoryBlobStore::new()), SyncConfig::default())
            .await
            .unwrap();
        let mut source = ObjectSource::from_bytes(ObjectKind::Blob, &b"short"[..]);
        source.length = 10;

        let err = repo.transaction().add_object(source).commit().await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidObject(_)));
    }

    #[tokio::test]
    async fn ref_updates_apply_to_the_writer_immediately() {
        let log = Arc::new(InMemoryLog::ephemeral());
        let repo = create_repo(log, Arc::new(InMemoryBlobStore::new()), SyncConfig::default())
            .await
            .unwrap();
        let entry = repo
            .transaction()
            .update_ref(RefOp::create("refs/heads/dev", hash(1)))
            .set_head("refs/heads/dev")
            .commit()
            .await
            .unwrap()
            .expect("published");

        assert_eq!(entry.author, repo.owner());
        assert_eq!(repo.refs_now(), vec![("refs/heads/dev".to_string(), hash(1))]);
        assert_eq!(repo.head().await.unwrap().as_deref(), Some("refs/heads/dev"));
    }
}
