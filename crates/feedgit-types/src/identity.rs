use std::fmt;

use crate::error::TypeError;
use crate::hexid::decode_fixed;

/// Identity of an append-only log.
///
/// A feed is owned by exactly one writer; its id is that writer's 32-byte
/// public key. Only the owner of a repository's feed may publish updates to
/// the repository.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedId([u8; 32]);

impl FeedId {
    /// Create from a raw 32-byte key.
    pub const fn from_raw(key: [u8; 32]) -> Self {
        Self(key)
    }

    /// Create a random feed id for tests and demos.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// The raw 32-byte key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex-encoded key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("@{}", hex::encode(&self.0[..4]))
    }

    /// Parse from 64 hex characters, with or without the `@` sigil.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix('@').unwrap_or(s);
        decode_fixed(s).map(Self)
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId({})", self.short_id())
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.to_hex())
    }
}

hex_serde!(FeedId);

/// Identifier of a single published log entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId([u8; 32]);

impl EntryId {
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

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from 64 hex characters, with or without the `%` sigil.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix('%').unwrap_or(s);
        decode_fixed(s).map(Self)
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId(%{})", self.short_hex())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.to_hex())
    }
}

hex_serde!(EntryId);

/// Repository identifier.
///
/// A repository is named by the log entry that created it, so the id is stable
/// for the repository's lifetime and globally unique.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId(EntryId);

impl RepoId {
    pub const fn new(creation: EntryId) -> Self {
        Self(creation)
    }

    /// The entry that created the repository.
    pub fn creation_entry(&self) -> EntryId {
        self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        EntryId::from_hex(s).map(Self)
    }

    pub fn short_hex(&self) -> String {
        self.0.short_hex()
    }
}

impl From<EntryId> for RepoId {
    fn from(id: EntryId) -> Self {
        Self(id)
    }
}

impl fmt::Debug for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoId(%{})", self.0.short_hex())
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

hex_serde!(RepoId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_feeds_are_unique() {
        assert_ne!(FeedId::ephemeral(), FeedId::ephemeral());
    }

    #[test]
    fn feed_short_id_format() {
        let id = FeedId::from_raw([0xab; 32]);
        assert_eq!(id.short_id(), "@abababab");
    }

    #[test]
    fn feed_hex_roundtrip_with_and_without_sigil() {
        let id = FeedId::from_raw([7; 32]);
        assert_eq!(FeedId::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(FeedId::from_hex(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn feed_rejects_wrong_length() {
        let err = FeedId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn feed_serializes_as_string() {
        let id = FeedId::from_raw([1; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"@{}\"", "01".repeat(32)));
        let parsed: FeedId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn repo_id_wraps_creation_entry() {
        let entry = EntryId::from_hash([9; 32]);
        let repo = RepoId::from(entry);
        assert_eq!(repo.creation_entry(), entry);
        assert_eq!(repo.to_string(), entry.to_string());
        assert_eq!(RepoId::from_hex(&repo.to_string()).unwrap(), repo);
    }
}
