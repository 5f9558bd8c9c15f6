use std::fmt;

/// Progress of a handle through its history.
///
/// Advances monotonically and never moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncState {
    Init,
    /// Reading the owner's feed, newest entry first.
    ReplayingHistory,
    /// Every historical entry has been applied; refs and HEAD are settled.
    RefsSynced,
    /// Overflow blobs have been merged too; missing objects are absent.
    FullySynced,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::ReplayingHistory => "replaying-history",
            Self::RefsSynced => "refs-synced",
            Self::FullySynced => "fully-synced",
        };
        f.write_str(s)
    }
}

/// Observable status of a repository handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Following the owner's feed for new entries.
    pub live_tailing: bool,
    pub closed: bool,
    /// Reason replay or tail stopped, if it failed.
    pub failure: Option<String>,
}

impl SyncStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: SyncState::Init,
            live_tailing: false,
            closed: false,
            failure: None,
        }
    }

    /// Fully synced, with no failure and not closed.
    pub fn is_healthy(&self) -> bool {
        self.state == SyncState::FullySynced && self.failure.is_none() && !self.closed
    }

    /// Whether waiting longer for `target` is pointless.
    pub(crate) fn reached_or_stopped(&self, target: SyncState) -> bool {
        self.state >= target || self.closed || self.failure.is_some()
    }
}
