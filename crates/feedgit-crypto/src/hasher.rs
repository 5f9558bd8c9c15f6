use sha1::{Digest, Sha1};

use feedgit_types::{BlobId, EntryId, GitHash, ObjectKind};

/// The git object id of a complete payload.
pub fn git_hash(kind: ObjectKind, payload: &[u8]) -> GitHash {
    let mut hasher = Sha1::new();
    hasher.update(git_header(kind, payload.len() as u64).as_bytes());
    hasher.update(payload);
    GitHash::from_bytes(hasher.finalize().into())
}

fn git_header(kind: ObjectKind, length: u64) -> String {
    format!("{} {}\0", kind.as_str(), length)
}

/// The blob-store digest of raw bytes.
pub fn storage_digest(data: &[u8]) -> BlobId {
    BlobId::from_hash(*blake3::hash(data).as_bytes())
}

/// Single-pass dual hasher for one git object.
///
/// The git header (`"<type> <length>\0"`) is fed to the sha1 state up front
/// from the declared length; [`finish`](Self::finish) rejects content whose
/// actual length disagrees, since the resulting sha1 would not be the
/// object's real id.
pub struct ObjectHasher {
    git: Sha1,
    storage: blake3::Hasher,
    declared: u64,
    seen: u64,
}

impl ObjectHasher {
    pub fn new(kind: ObjectKind, length: u64) -> Self {
        let mut git = Sha1::new();
        git.update(git_header(kind, length).as_bytes());
        Self {
            git,
            storage: blake3::Hasher::new(),
            declared: length,
            seen: 0,
        }
    }

    /// Feed the next chunk of payload to both digests.
    pub fn update(&mut self, chunk: &[u8]) {
        self.git.update(chunk);
        self.storage.update(chunk);
        self.seen += chunk.len() as u64;
    }

    /// Bytes fed so far.
    pub fn bytes_seen(&self) -> u64 {
        self.seen
    }

    /// Finalize into `(git object id, storage digest)`.
    pub fn finish(self) -> Result<(GitHash, BlobId), HasherError> {
        if self.seen != self.declared {
            return Err(HasherError::LengthMismatch {
                declared: self.declared,
                actual: self.seen,
            });
        }
        let git: [u8; 20] = self.git.finalize().into();
        Ok((
            GitHash::from_bytes(git),
            BlobId::from_hash(*self.storage.finalize().as_bytes()),
        ))
    }
}

/// Domain-separated BLAKE3 hasher for identifiers that are not object
/// content (log entries).
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for log entry ids.
    pub const ENTRY: Self = Self {
        domain: "feedgit-entry-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Id of a log entry from its canonical encoding.
    pub fn entry_id(data: &[u8]) -> EntryId {
        EntryId::from_hash(Self::ENTRY.hash(data))
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("object length mismatch: declared {declared} bytes, read {actual}")]
    LengthMismatch { declared: u64, actual: u64 },
}
