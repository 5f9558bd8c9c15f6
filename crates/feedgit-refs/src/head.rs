use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::debug;

use feedgit_types::MergePolicy;

use crate::ledger::RefLedger;

/// Branch HEAD points at when no head was ever published and it exists.
pub const DEFAULT_HEAD: &str = "refs/heads/master";

/// Result of asking for HEAD.
#[derive(Debug)]
pub enum HeadWait {
    /// HEAD is known. `None` means resolution finished without a head.
    Ready(Option<String>),
    /// HEAD is not known yet; the receiver fires once it is.
    Waiting(oneshot::Receiver<Option<String>>),
}

/// The symbolic HEAD of a repository.
///
/// Callers that ask before HEAD is known are queued and released exactly
/// once, in the order they asked, when a head is set or when resolution
/// finishes without one.
#[derive(Debug, Default)]
pub struct HeadResolver {
    head: Option<String>,
    settled: bool,
    waiters: VecDeque<oneshot::Sender<Option<String>>>,
}

impl HeadResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ref HEAD points at, if known.
    pub fn resolved(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Whether asking for HEAD would return immediately.
    pub fn is_settled(&self) -> bool {
        self.settled || self.head.is_some()
    }

    /// Point HEAD at `name` under `policy`. Returns `true` if HEAD changed.
    pub fn set(&mut self, name: &str, policy: MergePolicy) -> bool {
        if !policy.admits(self.head.is_some()) || self.head.as_deref() == Some(name) {
            return false;
        }
        debug!(head = name, "HEAD set");
        self.head = Some(name.to_string());
        self.release();
        true
    }

    /// Point HEAD at `name` unless it is already set.
    pub fn set_if_unset(&mut self, name: &str) -> bool {
        self.set(name, MergePolicy::FirstWriteWins)
    }

    /// Ask for HEAD, queueing if it is not known yet.
    pub fn on_resolved(&mut self) -> HeadWait {
        if self.is_settled() {
            return HeadWait::Ready(self.head.clone());
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        HeadWait::Waiting(rx)
    }

    /// Finish resolution once all history has been read.
    ///
    /// If no head was published, HEAD falls back to [`DEFAULT_HEAD`] when
    /// that ref exists, otherwise to the lexicographically smallest existing
    /// ref. With no refs at all HEAD stays unset. Every waiter is released.
    pub fn apply_default(&mut self, refs: &RefLedger) -> Option<&str> {
        if self.head.is_none() {
            let fallback = if refs.contains(DEFAULT_HEAD) {
                Some(DEFAULT_HEAD)
            } else {
                refs.names().next()
            };
            if let Some(name) = fallback {
                debug!(head = name, "HEAD defaulted");
                self.head = Some(name.to_string());
            }
        }
        self.settled = true;
        self.release();
        self.head.as_deref()
    }

    /// Drop every waiter without an answer. Their receivers observe a
    /// closed channel.
    pub fn abandon_waiters(&mut self) -> usize {
        let count = self.waiters.len();
        self.waiters.clear();
        count
    }

    /// Number of callers waiting for HEAD.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    fn release(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.send(self.head.clone());
        }
    }
}
