//! The single path by which an update lands in a handle's indexes.
//!
//! History replay, the live tail and local publishes all go through
//! [`RepoState::apply`]; only the [`MergePolicy`] differs.

use std::collections::HashSet;

use tracing::debug;

use feedgit_index::{ObjectIndex, PackPartition, PackRegistry};
use feedgit_protocol::{ObjectMap, UpdateMessage};
use feedgit_refs::{HeadResolver, RefLedger};
use feedgit_types::{BlobId, EntryId, MergePolicy};

/// Everything a handle knows about its repository.
#[derive(Debug, Default)]
pub(crate) struct RepoState {
    pub(crate) refs: RefLedger,
    pub(crate) objects: ObjectIndex,
    pub(crate) packs: PackRegistry,
    pub(crate) head: HeadResolver,
    /// Log entries already applied. The tail re-delivers entries this handle
    /// published or replayed.
    applied: HashSet<EntryId>,
}

impl RepoState {
    /// Apply the update carried by log entry `key` under `policy`. An entry
    /// is applied once; later deliveries of the same key change nothing.
    ///
    /// Returns the update's overflow blob if it has not been claimed before;
    /// the caller is then responsible for loading it and passing the result
    /// to [`merge_overflow`](Self::merge_overflow).
    pub(crate) fn apply(
        &mut self,
        key: EntryId,
        msg: &UpdateMessage,
        policy: MergePolicy,
    ) -> Option<BlobId> {
        if !self.applied.insert(key) {
            debug!(entry = %key.short_hex(), "update already applied");
            return None;
        }
        if let Some(head) = &msg.head {
            self.head.set(head, policy);
        }
        let mut refs_changed = 0;
        if let Some(refs) = &msg.refs {
            for (name, hash) in refs {
                if self.refs.merge(name, *hash, policy) {
                    refs_changed += 1;
                }
            }
        }
        let objects_added = self.objects.insert_all(&msg.objects, policy);
        let partition = PackPartition::for_policy(policy);
        for pack in &msg.packs {
            self.packs.push(*pack, partition);
        }

        // A handle that already settled HEAD without any refs picks one as
        // soon as refs appear.
        if self.head.is_settled() && self.head.resolved().is_none() && !self.refs.is_empty() {
            self.head.apply_default(&self.refs);
        }

        debug!(
            ?policy,
            refs = refs_changed,
            objects = objects_added,
            packs = msg.packs.len(),
            entry = %key.short_hex(),
            "update applied"
        );
        msg.objects_external_ref
            .filter(|id| self.objects.claim_overflow(*id))
    }

    pub(crate) fn merge_overflow(&mut self, objects: &ObjectMap, policy: MergePolicy) -> usize {
        self.objects.insert_all(objects, policy)
    }
}
