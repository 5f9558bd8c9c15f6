use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use feedgit_types::BlobId;

use crate::error::StoreResult;

/// A byte stream over one blob's content.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written; the same bytes always produce the
///   same id, and storing them again is a no-op.
/// - `fetch` of an id returned by `store` yields exactly the stored bytes.
/// - Missing or unobtainable blobs are errors, never empty streams.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return their content-addressed id.
    async fn store(&self, data: Bytes) -> StoreResult<BlobId>;

    /// Open a stream over a blob's content.
    async fn fetch(&self, id: &BlobId) -> StoreResult<BlobReader>;

    /// Check whether a blob is held locally.
    async fn exists(&self, id: &BlobId) -> StoreResult<bool>;

    /// Fetch a blob's full content into memory.
    ///
    /// Default implementation drains [`fetch`](Self::fetch). Backends that
    /// already hold content in memory may override it.
    async fn fetch_bytes(&self, id: &BlobId) -> StoreResult<Bytes> {
        let mut reader = self.fetch(id).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
