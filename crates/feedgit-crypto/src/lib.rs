//! Hashing primitives for feedgit.
//!
//! Two digests identify every object feedgit stores:
//!
//! - the git object id, sha1 over `"<type> <length>\0"` followed by the
//!   payload, which keys the object index;
//! - the storage digest, BLAKE3 over the raw payload, which addresses the
//!   content in the blob store.
//!
//! [`ObjectHasher`] computes both in a single pass over streamed content.
//! All crypto operations wrap established libraries.

pub mod hasher;

pub use hasher::{git_hash, storage_digest, ContentHasher, HasherError, ObjectHasher};
