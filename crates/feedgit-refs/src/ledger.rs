use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use feedgit_types::{GitHash, MergePolicy};

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;

/// One proposed ref change: move `name` from `old` to `new`.
///
/// `None` as `old` means the ref must not currently exist; `None` as `new`
/// deletes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefOp {
    pub name: String,
    pub old: Option<GitHash>,
    pub new: Option<GitHash>,
}

impl RefOp {
    pub fn new(name: impl Into<String>, old: Option<GitHash>, new: Option<GitHash>) -> Self {
        Self {
            name: name.into(),
            old,
            new,
        }
    }

    /// Create a ref that must not exist yet.
    pub fn create(name: impl Into<String>, new: GitHash) -> Self {
        Self::new(name, None, Some(new))
    }
}

/// Current value of every ref a repository has ever named.
///
/// A `None` value records a deletion. Deleted refs are not reported by
/// [`current_refs`](Self::current_refs), but a first-write-wins merge still
/// treats the name as seen, so an older value from history cannot resurrect
/// it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefLedger {
    entries: BTreeMap<String, Option<GitHash>>,
}

impl RefLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live value of `name`, if the ref currently exists.
    pub fn get(&self, name: &str) -> Option<GitHash> {
        self.entries.get(name).copied().flatten()
    }

    /// Returns `true` if `name` currently exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns `true` if `name` has been recorded at all, deleted or not.
    pub fn has_seen(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All existing refs, sorted by name.
    pub fn current_refs(&self) -> Vec<(String, GitHash)> {
        self.entries
            .iter()
            .filter_map(|(name, hash)| hash.map(|h| (name.clone(), h)))
            .collect()
    }

    /// Names of all existing refs, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, hash)| hash.is_some())
            .map(|(name, _)| name.as_str())
    }

    /// Number of existing refs.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|h| h.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `hash` for `name` under `policy`. Returns `true` if the ledger
    /// changed.
    pub fn merge(&mut self, name: &str, hash: Option<GitHash>, policy: MergePolicy) -> bool {
        if !policy.admits(self.has_seen(name)) {
            return false;
        }
        let previous = self.entries.insert(name.to_string(), hash);
        previous != Some(hash)
    }

    /// Merge a value read from history (newest first): the first value seen
    /// for a name is kept.
    pub fn historical_merge(&mut self, name: &str, hash: Option<GitHash>) -> bool {
        self.merge(name, hash, MergePolicy::FirstWriteWins)
    }

    /// Merge a live value: always replaces.
    pub fn live_merge(&mut self, name: &str, hash: Option<GitHash>) -> bool {
        self.merge(name, hash, MergePolicy::Overwrite)
    }

    /// Check a batch of updates against the current values.
    ///
    /// Either every op's `old` matches and the resulting changes are
    /// returned, or the first mismatch is reported. The ledger itself is
    /// never modified; callers apply the changes once they are published.
    pub fn propose_updates(&self, ops: &[RefOp]) -> Result<BTreeMap<String, Option<GitHash>>> {
        let mut seen = BTreeSet::new();
        let mut changes = BTreeMap::new();
        for op in ops {
            validate_ref_name(&op.name)?;
            if !seen.insert(op.name.as_str()) {
                return Err(RefError::DuplicateUpdate {
                    name: op.name.clone(),
                });
            }
            let actual = self.get(&op.name);
            if actual != op.old {
                debug!(name = %op.name, "ref update rejected: stale old value");
                return Err(RefError::Conflict {
                    name: op.name.clone(),
                    expected: op.old,
                    actual,
                });
            }
            changes.insert(op.name.clone(), op.new);
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn h(n: u8) -> GitHash {
        GitHash::from_bytes([n; 20])
    }

    #[test]
    fn historical_merge_keeps_newest() {
        let mut ledger = RefLedger::new();
        assert!(ledger.historical_merge("refs/heads/master", Some(h(2))));
        assert!(!ledger.historical_merge("refs/heads/master", Some(h(1))));
        assert_eq!(ledger.get("refs/heads/master"), Some(h(2)));
    }

    #[test]
    fn historical_deletion_blocks_older_values() {
        let mut ledger = RefLedger::new();
        ledger.historical_merge("refs/heads/gone", None);
        ledger.historical_merge("refs/heads/gone", Some(h(1)));
        assert!(!ledger.contains("refs/heads/gone"));
        assert!(ledger.has_seen("refs/heads/gone"));
        assert!(ledger.current_refs().is_empty());
    }

    #[test]
    fn live_merge_overwrites_and_deletes() {
        let mut ledger = RefLedger::new();
        ledger.live_merge("refs/heads/master", Some(h(1)));
        ledger.live_merge("refs/heads/master", Some(h(2)));
        assert_eq!(ledger.get("refs/heads/master"), Some(h(2)));

        ledger.live_merge("refs/heads/master", None);
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
        assert!(ledger.has_seen("refs/heads/master"));
    }

    #[test]
    fn current_refs_sorted() {
        let mut ledger = RefLedger::new();
        ledger.live_merge("refs/heads/zeta", Some(h(1)));
        ledger.live_merge("refs/heads/alpha", Some(h(2)));
        ledger.live_merge("refs/heads/mid", None);
        let names: Vec<_> = ledger.names().collect();
        assert_eq!(names, vec!["refs/heads/alpha", "refs/heads/zeta"]);
        assert_eq!(ledger.current_refs()[0], ("refs/heads/alpha".to_string(), h(2)));
    }

    #[test]
    fn propose_updates_is_all_or_nothing() {
        let mut ledger = RefLedger::new();
        ledger.live_merge("refs/heads/a", Some(h(1)));
        ledger.live_merge("refs/heads/b", Some(h(2)));
        let before = ledger.clone();

        let err = ledger
            .propose_updates(&[
                RefOp::new("refs/heads/a", Some(h(1)), Some(h(3))),
                RefOp::new("refs/heads/b", Some(h(9)), Some(h(4))),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            RefError::Conflict {
                name: "refs/heads/b".into(),
                expected: Some(h(9)),
                actual: Some(h(2)),
            }
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn propose_updates_returns_changes() {
        let mut ledger = RefLedger::new();
        ledger.live_merge("refs/heads/a", Some(h(1)));
        let changes = ledger
            .propose_updates(&[
                RefOp::new("refs/heads/a", Some(h(1)), None),
                RefOp::create("refs/heads/new", h(5)),
            ])
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["refs/heads/a"], None);
        assert_eq!(changes["refs/heads/new"], Some(h(5)));
        // Not applied.
        assert_eq!(ledger.get("refs/heads/a"), Some(h(1)));
    }

    #[test]
    fn deleted_ref_expects_absent() {
        let mut ledger = RefLedger::new();
        ledger.live_merge("refs/heads/a", Some(h(1)));
        ledger.live_merge("refs/heads/a", None);
        assert!(ledger
            .propose_updates(&[RefOp::create("refs/heads/a", h(2))])
            .is_ok());
    }

    #[test]
    fn propose_updates_rejects_bad_names_and_duplicates() {
        let ledger = RefLedger::new();
        assert!(matches!(
            ledger.propose_updates(&[RefOp::create("master", h(1))]),
            Err(RefError::InvalidName { .. })
        ));
        assert!(matches!(
            ledger.propose_updates(&[
                RefOp::create("refs/heads/x", h(1)),
                RefOp::create("refs/heads/x", h(2)),
            ]),
            Err(RefError::DuplicateUpdate { .. })
        ));
    }

    fn ref_changes() -> impl Strategy<Value = Vec<(String, Option<GitHash>)>> {
        prop::collection::vec(
            (
                prop::sample::select(vec!["refs/heads/a", "refs/heads/b", "refs/tags/c"]),
                prop::option::of(any::<u8>().prop_map(h)),
            ),
            0..6,
        )
        .prop_map(|v| v.into_iter().map(|(n, h)| (n.to_string(), h)).collect())
    }

    proptest! {
        #[test]
        fn newest_entry_wins_for_shared_names(
            newer in ref_changes(),
            older in ref_changes(),
        ) {
            let mut replayed = RefLedger::new();
            for (name, hash) in newer.iter().chain(older.iter()) {
                replayed.historical_merge(name, *hash);
            }

            let mut newest_only = RefLedger::new();
            for (name, hash) in &newer {
                newest_only.historical_merge(name, *hash);
            }

            for (name, _) in &newer {
                prop_assert_eq!(replayed.get(name), newest_only.get(name));
            }
        }

        #[test]
        fn historical_replay_is_idempotent(entry in ref_changes()) {
            let mut once = RefLedger::new();
            for (name, hash) in &entry {
                once.historical_merge(name, *hash);
            }
            let mut twice = once.clone();
            for (name, hash) in &entry {
                twice.historical_merge(name, *hash);
            }
            prop_assert_eq!(once, twice);
        }
    }
}
