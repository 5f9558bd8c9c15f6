use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hexid::decode_fixed;

/// A git object id: the sha1 of `"<type> <length>\0" + payload`.
///
/// This is the key of the object index and the one self-verifying property
/// of an object that feedgit relies on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitHash([u8; 20]);

impl GitHash {
    /// Create from a pre-computed sha1 digest.
    pub const fn from_bytes(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// The raw 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// 40-character hex form, as git prints it.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form (first 7 characters).
    pub fn short_hex(&self) -> String {
        let mut s = hex::encode(&self.0[..4]);
        s.truncate(7);
        s
    }

    /// Parse from 40 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_fixed(s).map(Self)
    }
}

impl fmt::Debug for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitHash({})", self.short_hex())
    }
}

impl fmt::Display for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for GitHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

hex_serde!(GitHash);

/// Content digest addressing a blob in the blob store.
///
/// Blob ids are computed by the blob store over the raw bytes it holds; two
/// stores given the same bytes produce the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId([u8; 32]);

impl BlobId {
    /// Create from a pre-computed digest.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from 64 hex characters, with or without the `&` sigil.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix('&').unwrap_or(s);
        decode_fixed(s).map(Self)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId(&{})", self.short_hex())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}", self.to_hex())
    }
}

impl FromStr for BlobId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

hex_serde!(BlobId);

/// The four git object types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// The name used in the git object header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    /// Whether reads of this kind may be served from an in-memory cache.
    ///
    /// Blob payloads are unbounded and typically read once, so they always
    /// stream from the store.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::Blob)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(Self::Commit),
            "tree" => Ok(Self::Tree),
            "blob" => Ok(Self::Blob),
            "tag" => Ok(Self::Tag),
            other => Err(TypeError::UnknownObjectKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_hash_hex_roundtrip() {
        let hash = GitHash::from_bytes([0x5a; 20]);
        assert_eq!(hash.to_hex().len(), 40);
        assert_eq!(GitHash::from_hex(&hash.to_hex()).unwrap(), hash);
    }

    #[test]
    fn git_hash_rejects_blob_length() {
        let err = GitHash::from_hex(&"00".repeat(32)).unwrap_err();
        assert!(matches!(err, TypeError::InvalidLength { expected: 20, actual: 32 }));
    }

    #[test]
    fn git_hash_short_hex_is_7_chars() {
        let hash = GitHash::from_bytes([0xff; 20]);
        assert_eq!(hash.short_hex(), "fffffff");
    }

    #[test]
    fn blob_id_display_carries_sigil() {
        let id = BlobId::from_hash([3; 32]);
        let shown = id.to_string();
        assert!(shown.starts_with('&'));
        assert_eq!(shown.parse::<BlobId>().unwrap(), id);
    }

    #[test]
    fn git_hash_is_a_json_string_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(GitHash::from_bytes([1; 20]), 5u32);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains(&"01".repeat(20)));
        let back: std::collections::BTreeMap<GitHash, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn object_kind_names() {
        for kind in [ObjectKind::Commit, ObjectKind::Tree, ObjectKind::Blob, ObjectKind::Tag] {
            assert_eq!(kind.as_str().parse::<ObjectKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
        assert!("blobby".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn only_blobs_bypass_the_cache() {
        assert!(!ObjectKind::Blob.is_cacheable());
        assert!(ObjectKind::Tree.is_cacheable());
        assert!(ObjectKind::Commit.is_cacheable());
        assert!(ObjectKind::Tag.is_cacheable());
    }
}
