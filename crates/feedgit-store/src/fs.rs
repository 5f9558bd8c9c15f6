//! Filesystem blob store.
//!
//! Blobs live at `<root>/<first two hex chars>/<remaining hex>`. Writes go to
//! a temporary sibling first and are renamed into place, so a crash never
//! leaves a partially written blob under its final name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use feedgit_crypto::storage_digest;
use feedgit_types::BlobId;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobStore};

/// A [`BlobStore`] backed by one file per blob.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &BlobId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, data: Bytes) -> StoreResult<BlobId> {
        let id = storage_digest(&data);
        let path = self.path_for(&id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(blob = %id.short_hex(), len = data.len(), "blob written");
        Ok(id)
    }

    async fn fetch(&self, id: &BlobId) -> StoreResult<BlobReader> {
        match tokio::fs::File::open(self.path_for(id)).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &BlobId) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.path_for(id)).await?)
    }

    async fn fetch_bytes(&self, id: &BlobId) -> StoreResult<Bytes> {
        let data = match tokio::fs::read(self.path_for(id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };
        let computed = storage_digest(&data);
        if computed != *id {
            return Err(StoreError::DigestMismatch { id: *id, computed });
        }
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs")).await.unwrap();

        let id = store.store(Bytes::from_static(b"on disk")).await.unwrap();
        assert!(store.exists(&id).await.unwrap());

        let mut reader = store.fetch(&id).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"on disk");

        let hex = id.to_hex();
        assert!(dir.path().join("blobs").join(&hex[..2]).join(&hex[2..]).exists());
    }

    #[tokio::test]
    async fn reopen_sees_existing_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FsBlobStore::open(dir.path()).await.unwrap();
            store.store(Bytes::from_static(b"persisted")).await.unwrap()
        };
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        assert_eq!(store.fetch_bytes(&id).await.unwrap(), Bytes::from_static(b"persisted"));
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        let id = storage_digest(b"absent");
        assert!(!store.exists(&id).await.unwrap());
        assert!(matches!(store.fetch(&id).await.err().unwrap(), StoreError::NotFound(_)));
        assert!(matches!(store.fetch_bytes(&id).await.unwrap_err(), StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn corrupted_blob_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        let id = store.store(Bytes::from_static(b"original")).await.unwrap();
        let hex = id.to_hex();
        std::fs::write(dir.path().join(&hex[..2]).join(&hex[2..]), b"tampered").unwrap();
        assert!(matches!(
            store.fetch_bytes(&id).await.unwrap_err(),
            StoreError::DigestMismatch { .. }
        ));
    }
}
