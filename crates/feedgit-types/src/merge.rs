use serde::{Deserialize, Serialize};

/// How a store reconciles a value for a key it may already hold.
///
/// History is replayed newest-first, so the first value seen for a key is the
/// latest one and later (older) values are discarded. Live entries arrive in
/// true chronological order and each one replaces what came before.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Keep an existing value; only fill keys not yet seen.
    FirstWriteWins,
    /// Replace any existing value.
    Overwrite,
}

impl MergePolicy {
    /// Whether a write should land given whether the key is already present.
    pub fn admits(&self, already_present: bool) -> bool {
        match self {
            Self::FirstWriteWins => !already_present,
            Self::Overwrite => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_wins_only_fills_gaps() {
        assert!(MergePolicy::FirstWriteWins.admits(false));
        assert!(!MergePolicy::FirstWriteWins.admits(true));
    }

    #[test]
    fn overwrite_always_admits() {
        assert!(MergePolicy::Overwrite.admits(false));
        assert!(MergePolicy::Overwrite.admits(true));
    }
}
