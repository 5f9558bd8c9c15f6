//! Foundation types for feedgit.
//!
//! feedgit exposes a git repository whose refs, objects, and packfiles live on
//! an append-only, per-owner log plus a content-addressed blob store. This
//! crate holds the identifiers every other feedgit crate shares.
//!
//! # Key Types
//!
//! - [`FeedId`]: Identity of an append-only log (its owner)
//! - [`EntryId`]: Identifier of one published log entry
//! - [`RepoId`]: Repository identifier (the id of its creation entry)
//! - [`GitHash`]: 20-byte git object id (sha1)
//! - [`BlobId`]: 32-byte content digest addressing the blob store
//! - [`ObjectKind`]: commit, tree, blob, or tag
//! - [`Timestamp`]: Millisecond wall-clock time used for tail subscriptions
//! - [`MergePolicy`]: First-write-wins (history) vs overwrite (live)

#[macro_use]
mod hexid;

pub mod error;
pub mod identity;
pub mod merge;
pub mod object;
pub mod temporal;

pub use error::TypeError;
pub use identity::{EntryId, FeedId, RepoId};
pub use merge::MergePolicy;
pub use object::{BlobId, GitHash, ObjectKind};
pub use temporal::Timestamp;
