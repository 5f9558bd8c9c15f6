//! Content-addressed blob storage for feedgit.
//!
//! feedgit never owns durable object storage: object payloads, packfiles,
//! pack indexes, and spilled object maps all live in an external blob store
//! addressed by content digest. This crate defines that boundary.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsBlobStore`] -- one file per blob under a fan-out directory
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written (content-addressing guarantees this).
//! 2. `store` returns the id the store computed; callers never choose ids.
//! 3. Availability is the store's concern: a blob that cannot be obtained is
//!    reported as an error, never as empty content.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use traits::{BlobReader, BlobStore};
