use tracing::{debug, warn};

use feedgit_protocol::{ObjectMap, UpdateCodec};
use feedgit_store::BlobStore;
use feedgit_types::BlobId;

/// Fetch and decode an overflow blob of object descriptors.
///
/// Failures are not propagated: a blob that cannot be fetched or decoded
/// contributes no objects. The objects it named stay unindexed and later
/// lookups for them report absent once history is complete.
pub async fn load_overflow(store: &dyn BlobStore, id: &BlobId) -> ObjectMap {
    let bytes = match store.fetch_bytes(id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(blob = %id.short_hex(), error = %e, "overflow blob unavailable, skipping");
            return ObjectMap::new();
        }
    };
    match UpdateCodec::decode_object_map(&bytes) {
        Ok(objects) => {
            debug!(blob = %id.short_hex(), objects = objects.len(), "overflow blob loaded");
            objects
        }
        Err(e) => {
            warn!(blob = %id.short_hex(), error = %e, "overflow blob malformed, skipping");
            ObjectMap::new()
        }
    }
}
