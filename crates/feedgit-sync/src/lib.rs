//! Repository handles over an append-only log.
//!
//! A repository is the sequence of `git-update` records its owner publishes
//! on their feed. Opening a [`Repository`] replays that feed newest first to
//! rebuild refs, HEAD, the object index and the pack list, then optionally
//! tails it for new updates. Objects and packs live in a content-addressed
//! [`BlobStore`](feedgit_store::BlobStore); the log only carries descriptors.
//!
//! # Sync states
//!
//! A handle moves through [`SyncState`]s:
//!
//! ```text
//! Init -> ReplayingHistory -> RefsSynced -> FullySynced
//! ```
//!
//! Ref and pack reads wait for `RefsSynced`. Object lookups for hashes not
//! yet seen wait until `FullySynced`, so a miss is only reported once every
//! overflow blob from history has been merged.
//!
//! # Writing
//!
//! Only the owner can publish. An [`UpdateTransaction`] uploads objects,
//! checks ref changes against current values and publishes one entry,
//! spilling object descriptors into an overflow blob when the entry would
//! exceed the log's size limit.

mod apply;
mod cache;
pub mod config;
mod engine;
pub mod error;
pub mod object;
pub mod repository;
pub mod state;
pub mod transaction;

#[cfg(test)]
mod testutil;

pub use config::SyncConfig;
pub use error::{RepoError, RepoResult};
pub use feedgit_index::Probe;
pub use object::{GitObject, ObjectSource, PackSource};
pub use repository::{create_repo, open_repo, RepoHandle, Repository};
pub use state::{SyncState, SyncStatus};
pub use transaction::UpdateTransaction;
