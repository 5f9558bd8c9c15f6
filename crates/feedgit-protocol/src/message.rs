use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use feedgit_types::{BlobId, GitHash, ObjectKind, RepoId};

/// Type tag of repository update records.
pub const UPDATE_TYPE: &str = "git-update";
/// Type tag of repository creation records.
pub const REPO_TYPE: &str = "git-repo";
/// Schema version written by [`UpdateCodec::encode`](crate::UpdateCodec::encode).
pub const SCHEMA_VERSION: u64 = 2;

/// Where an object's content lives, and what it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Byte count of the uncompressed payload.
    pub length: u64,
    /// Blob holding the payload.
    pub link: BlobId,
}

/// A packfile and its optional index, both stored as blobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackEntry {
    pub pack: BlobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<BlobId>,
}

/// Object descriptors keyed by git object id.
pub type ObjectMap = BTreeMap<GitHash, ObjectDescriptor>;

/// Ref name to new value; `None` deletes the ref.
pub type RefChanges = BTreeMap<String, Option<GitHash>>;

/// The unit of mutation appended to the log.
///
/// Only the fields relevant to a given write are present on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub repo: RepoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<RefChanges>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub objects: ObjectMap,
    /// Blob holding a JSON [`ObjectMap`] that did not fit inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects_external_ref: Option<BlobId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packs: Vec<PackEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
}

impl UpdateMessage {
    pub fn new(repo: RepoId) -> Self {
        Self {
            repo,
            refs: None,
            objects: ObjectMap::new(),
            objects_external_ref: None,
            packs: Vec::new(),
            head: None,
        }
    }

    /// Returns `true` if the message would change nothing.
    pub fn is_empty(&self) -> bool {
        self.refs.as_ref().map_or(true, BTreeMap::is_empty)
            && self.objects.is_empty()
            && self.objects_external_ref.is_none()
            && self.packs.is_empty()
            && self.head.is_none()
    }
}
