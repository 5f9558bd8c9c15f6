use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use feedgit_store::BlobReader;
use feedgit_types::ObjectKind;

use crate::error::RepoResult;

/// An object read back from a repository.
pub struct GitObject {
    pub kind: ObjectKind,
    pub length: u64,
    pub reader: BlobReader,
}

impl GitObject {
    /// Read the whole payload into memory.
    pub async fn into_bytes(mut self) -> RepoResult<Bytes> {
        let mut buf = Vec::with_capacity(capacity_hint(self.length));
        self.reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for GitObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitObject")
            .field("kind", &self.kind)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// An object to add in an update transaction.
///
/// `length` must equal the number of bytes `content` yields; the git object
/// id is computed over a header carrying it.
pub struct ObjectSource {
    pub kind: ObjectKind,
    pub length: u64,
    pub content: BlobReader,
}

impl ObjectSource {
    pub fn new(kind: ObjectKind, length: u64, content: BlobReader) -> Self {
        Self {
            kind,
            length,
            content,
        }
    }

    pub fn from_bytes(kind: ObjectKind, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            kind,
            length: data.len() as u64,
            content: Box::pin(Cursor::new(data)),
        }
    }
}

impl fmt::Debug for ObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSource")
            .field("kind", &self.kind)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// A packfile and optional pack index to add in an update transaction.
pub struct PackSource {
    pub pack: BlobReader,
    pub index: Option<BlobReader>,
}

impl PackSource {
    pub fn new(pack: BlobReader, index: Option<BlobReader>) -> Self {
        Self { pack, index }
    }

    pub fn from_bytes(pack: impl Into<Bytes>, index: Option<Bytes>) -> Self {
        Self {
            pack: Box::pin(Cursor::new(pack.into())),
            index: index.map(|i| -> BlobReader { Box::pin(Cursor::new(i)) }),
        }
    }
}

impl fmt::Debug for PackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackSource")
            .field("has_index", &self.index.is_some())
            .finish_non_exhaustive()
    }
}

/// Preallocation for content of a declared length, capped so a bogus length
/// cannot force a huge allocation up front.
pub(crate) fn capacity_hint(length: u64) -> usize {
    length.min(1 << 20) as usize
}
