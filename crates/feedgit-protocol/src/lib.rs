//! On-log record schema for feedgit.
//!
//! A repository is created by a `git-repo` record and mutated by
//! `git-update` records, both published as JSON content on the owner's feed.
//!
//! - [`UpdateMessage`]: ref changes, object descriptors, pack entries and an
//!   optional HEAD for one repository.
//! - [`UpdateCodec`]: canonical encoding (`schema: 2`), size measurement,
//!   and a decoder that also reads records written before the schema field
//!   existed.
//! - [`ObjectMap`] overflow codec for descriptors spilled to a blob.

pub mod codec;
pub mod error;
mod legacy;
pub mod message;

pub use codec::UpdateCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    ObjectDescriptor, ObjectMap, PackEntry, RefChanges, UpdateMessage, REPO_TYPE, SCHEMA_VERSION,
    UPDATE_TYPE,
};
