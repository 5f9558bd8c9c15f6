use feedgit_protocol::PackEntry;
use feedgit_types::MergePolicy;

/// Which half of the registry a pack entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackPartition {
    /// Read from history during replay.
    Historical,
    /// Received after replay, from the tail or a local publish.
    Live,
}

impl PackPartition {
    /// The partition that goes with a merge policy: history merges
    /// first-write-wins, live entries overwrite.
    pub fn for_policy(policy: MergePolicy) -> Self {
        match policy {
            MergePolicy::FirstWriteWins => Self::Historical,
            MergePolicy::Overwrite => Self::Live,
        }
    }
}

/// Packs advertised by a repository, split by how they were discovered.
///
/// No deduplication happens across partitions: a pack re-advertised live
/// after appearing in history is listed twice.
#[derive(Clone, Debug, Default)]
pub struct PackRegistry {
    historical: Vec<PackEntry>,
    /// In arrival order; read back most recent first.
    live: Vec<PackEntry>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PackEntry, partition: PackPartition) {
        match partition {
            PackPartition::Historical => self.historical.push(entry),
            PackPartition::Live => self.live.push(entry),
        }
    }

    /// Packs found in history, in the order replay discovered them.
    pub fn historical_packs(&self) -> &[PackEntry] {
        &self.historical
    }

    /// Packs received live, most recent first.
    pub fn live_packs(&self) -> Vec<PackEntry> {
        self.live.iter().rev().copied().collect()
    }

    /// Live packs followed by historical packs.
    pub fn all_packs(&self) -> Vec<PackEntry> {
        self.live
            .iter()
            .rev()
            .chain(self.historical.iter())
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.historical.len() + self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
