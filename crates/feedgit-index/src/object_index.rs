use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;
use tracing::debug;

use feedgit_protocol::{ObjectDescriptor, ObjectMap};
use feedgit_types::{BlobId, GitHash, MergePolicy};

use crate::error::{IndexError, IndexResult};

/// What a queued lookup is eventually told.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(ObjectDescriptor),
    /// History was fully searched and the object is not in it.
    Absent,
    /// Replay failed before the object was found.
    Failed(String),
}

/// Answer to [`ObjectIndex::lookup`].
#[derive(Debug)]
pub enum Lookup {
    Found(ObjectDescriptor),
    Absent,
    /// Not indexed yet and history is still being replayed.
    Pending(oneshot::Receiver<Resolution>),
}

impl Lookup {
    /// Wait for a final answer.
    pub async fn resolve(self) -> IndexResult<Option<ObjectDescriptor>> {
        match self {
            Self::Found(desc) => Ok(Some(desc)),
            Self::Absent => Ok(None),
            Self::Pending(rx) => match rx.await {
                Ok(Resolution::Found(desc)) => Ok(Some(desc)),
                Ok(Resolution::Absent) => Ok(None),
                Ok(Resolution::Failed(reason)) => Err(IndexError::SyncFailed(reason)),
                Err(_) => Err(IndexError::Abandoned),
            },
        }
    }
}

/// Non-waiting answer to "is this object here?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    Present(ObjectDescriptor),
    /// Definitely not in the repository.
    Absent,
    /// Not seen yet, but history has not been fully read.
    Unknown,
}

/// Git object id to descriptor, with pending lookups for ids not yet seen.
#[derive(Debug, Default)]
pub struct ObjectIndex {
    objects: HashMap<GitHash, ObjectDescriptor>,
    /// Waiters per id, in arrival order.
    pending: HashMap<GitHash, Vec<oneshot::Sender<Resolution>>>,
    history_complete: bool,
    /// Overflow blobs already merged or in flight.
    claimed_overflow: HashSet<BlobId>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &GitHash) -> Option<&ObjectDescriptor> {
        self.objects.get(hash)
    }

    pub fn contains(&self, hash: &GitHash) -> bool {
        self.objects.contains_key(hash)
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether every historical entry (and overflow blob) has been merged.
    pub fn is_history_complete(&self) -> bool {
        self.history_complete
    }

    /// Number of distinct ids with queued lookups.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Record `desc` for `hash` under `policy`, then release anyone waiting
    /// for `hash` in the order they asked. Returns `true` if the index
    /// changed.
    pub fn insert(&mut self, hash: GitHash, desc: ObjectDescriptor, policy: MergePolicy) -> bool {
        let present = self.objects.get(&hash);
        if !policy.admits(present.is_some()) || present == Some(&desc) {
            return false;
        }
        self.objects.insert(hash, desc);
        if let Some(waiters) = self.pending.remove(&hash) {
            debug!(object = %hash.short_hex(), waiters = waiters.len(), "pending lookups resolved");
            for waiter in waiters {
                let _ = waiter.send(Resolution::Found(desc));
            }
        }
        true
    }

    /// Insert every descriptor in `objects`. Returns how many landed.
    pub fn insert_all(&mut self, objects: &ObjectMap, policy: MergePolicy) -> usize {
        objects
            .iter()
            .filter(|(hash, desc)| self.insert(**hash, **desc, policy))
            .count()
    }

    /// Look up `hash`, queueing if it may still turn up in history.
    pub fn lookup(&mut self, hash: &GitHash) -> Lookup {
        if let Some(desc) = self.objects.get(hash) {
            return Lookup::Found(*desc);
        }
        if self.history_complete {
            return Lookup::Absent;
        }
        let (tx, rx) = oneshot::channel();
        self.pending.entry(*hash).or_default().push(tx);
        Lookup::Pending(rx)
    }

    /// Answer without waiting.
    pub fn probe(&self, hash: &GitHash) -> Probe {
        match self.objects.get(hash) {
            Some(desc) => Probe::Present(*desc),
            None if self.history_complete => Probe::Absent,
            None => Probe::Unknown,
        }
    }

    /// Mark history as fully merged. Every queued lookup resolves as absent
    /// and later misses answer immediately. Returns how many lookups were
    /// released.
    pub fn finish_history(&mut self) -> usize {
        self.history_complete = true;
        let mut released = 0;
        for (_, waiters) in self.pending.drain() {
            for waiter in waiters {
                let _ = waiter.send(Resolution::Absent);
                released += 1;
            }
        }
        released
    }

    /// Fail every queued lookup with `reason`.
    pub fn fail_pending(&mut self, reason: &str) -> usize {
        let mut failed = 0;
        for (_, waiters) in self.pending.drain() {
            for waiter in waiters {
                let _ = waiter.send(Resolution::Failed(reason.to_string()));
                failed += 1;
            }
        }
        failed
    }

    /// Drop every queued lookup without an answer.
    pub fn abandon_pending(&mut self) {
        self.pending.clear();
    }

    /// Claim an overflow blob for loading. Returns `false` if it was already
    /// claimed, in which case the caller must not fetch it again.
    pub fn claim_overflow(&mut self, id: BlobId) -> bool {
        self.claimed_overflow.insert(id)
    }

    pub fn is_overflow_claimed(&self, id: &BlobId) -> bool {
        self.claimed_overflow.contains(id)
    }
}
