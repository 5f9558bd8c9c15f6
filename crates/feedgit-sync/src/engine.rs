//! The sync task behind every [`Repository`](crate::Repository).
//!
//! Replays the owner's feed newest first, merging first-write-wins, while
//! overflow blobs load concurrently. When the replay stream ends refs are
//! settled; once every overflow load has finished misses become final. With
//! live tailing the task then follows the feed from the time the handle was
//! opened, overwriting as entries arrive.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use feedgit_index::load_overflow;
use feedgit_log::{LogEntry, LogError};
use feedgit_protocol::{ObjectMap, UpdateCodec, UpdateMessage};
use feedgit_types::{BlobId, MergePolicy, Timestamp};

use crate::error::RepoResult;
use crate::repository::Shared;

pub(crate) async fn run(shared: Arc<Shared>, since: Timestamp, replay: bool) {
    let result = async {
        if replay {
            replay_history(&shared).await?;
        }
        if shared.config.live {
            tail(&shared, since).await?;
        }
        RepoResult::Ok(())
    }
    .await;

    if let Err(e) = result {
        shared.record_failure(e.to_string());
    }
}

async fn replay_history(shared: &Arc<Shared>) -> RepoResult<()> {
    shared.start_replay();
    let mut history = shared.log.replay_history(&shared.handle.feed).await?;
    let mut overflow: JoinSet<(BlobId, ObjectMap)> = JoinSet::new();
    let mut entries = 0usize;

    loop {
        tokio::select! {
            item = history.recv() => match item {
                Some(Ok(entry)) => {
                    let Some(msg) = decode(shared, &entry) else { continue };
                    entries += 1;
                    if let Some(blob) = shared.apply(entry.key, &msg, MergePolicy::FirstWriteWins) {
                        spawn_overflow_load(shared, &mut overflow, blob);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            Some(joined) = overflow.join_next(), if !overflow.is_empty() => {
                merge_loaded(shared, joined, MergePolicy::FirstWriteWins);
            }
        }
    }

    debug!(repo = %shared.handle.id.short_hex(), entries, pending_overflow = overflow.len(), "history replayed");
    shared.refs_synced();

    while let Some(joined) = overflow.join_next().await {
        merge_loaded(shared, joined, MergePolicy::FirstWriteWins);
    }
    shared.fully_synced();
    Ok(())
}

async fn tail(shared: &Arc<Shared>, since: Timestamp) -> RepoResult<()> {
    let mut live = shared.log.tail(&shared.handle.feed, since).await?;
    shared.set_live_tailing(true);

    while let Some(item) = live.recv().await {
        let entry = item?;
        let Some(msg) = decode(shared, &entry) else {
            continue;
        };
        if let Some(blob) = shared.apply(entry.key, &msg, MergePolicy::Overwrite) {
            let objects = load_overflow(shared.store.as_ref(), &blob).await;
            shared.merge_overflow(&objects, MergePolicy::Overwrite);
        }
    }
    Err(LogError::StreamClosed.into())
}

/// Decode an entry if it is an update for this repository.
fn decode(shared: &Shared, entry: &LogEntry) -> Option<UpdateMessage> {
    if entry.author != shared.handle.feed || !UpdateCodec::targets(&entry.content, &shared.handle.id) {
        return None;
    }
    match UpdateCodec::decode(&entry.content) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!(entry = %entry.key.short_hex(), error = %e, "skipping undecodable update");
            None
        }
    }
}

fn spawn_overflow_load(shared: &Arc<Shared>, set: &mut JoinSet<(BlobId, ObjectMap)>, blob: BlobId) {
    let store = shared.store.clone();
    set.spawn(async move {
        let objects = load_overflow(store.as_ref(), &blob).await;
        (blob, objects)
    });
}

fn merge_loaded(
    shared: &Shared,
    joined: Result<(BlobId, ObjectMap), tokio::task::JoinError>,
    policy: MergePolicy,
) {
    match joined {
        Ok((blob, objects)) => {
            let added = shared.merge_overflow(&objects, policy);
            debug!(blob = %blob.short_hex(), added, "overflow merged");
        }
        Err(e) => warn!(error = %e, "overflow load task failed"),
    }
}
