use std::collections::HashMap;
use std::io::Cursor;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use feedgit_crypto::storage_digest;
use feedgit_types::BlobId;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobStore};

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are held as shared [`Bytes`], so
/// reads never copy payloads.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Drop a blob, as if it had been garbage-collected upstream.
    ///
    /// Returns `true` if the blob existed.
    pub fn forget(&self, id: &BlobId) -> bool {
        self.blobs
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some()
    }

    fn get(&self, id: &BlobId) -> StoreResult<Bytes> {
        self.blobs
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, data: Bytes) -> StoreResult<BlobId> {
        let id = storage_digest(&data);
        let mut map = self.blobs.write().expect("lock poisoned");
        // Idempotent: the same id always maps to the same content.
        map.entry(id).or_insert(data);
        Ok(id)
    }

    async fn fetch(&self, id: &BlobId) -> StoreResult<BlobReader> {
        let data = self.get(id)?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn exists(&self, id: &BlobId) -> StoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(id))
    }

    async fn fetch_bytes(&self, id: &BlobId) -> StoreResult<Bytes> {
        self.get(id)
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}
