//! Reader for update records that predate the `schema` field.
//!
//! Older writers used several shapes for the same information:
//!
//! - objects as a sha1-keyed map, or as an array of entries carrying their
//!   own `sha1` field;
//! - the content blob as `link` or as `key`;
//! - packs as `[{link}]` with a parallel `indexes: [{link}]` array, or as
//!   `[{pack: {link}, idx: {link}}]`;
//! - deleted refs as any falsy value.

use serde_json::{Map, Value};

use feedgit_types::{BlobId, GitHash, ObjectKind, RepoId};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{ObjectDescriptor, ObjectMap, PackEntry, RefChanges, UpdateMessage};

pub(crate) fn decode_update(obj: &Map<String, Value>) -> ProtocolResult<UpdateMessage> {
    let repo = obj
        .get("repo")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing repo"))?;
    let mut msg = UpdateMessage::new(RepoId::from_hex(repo).map_err(malformed)?);

    if let Some(refs) = obj.get("refs").filter(|v| !v.is_null()) {
        msg.refs = Some(decode_refs(refs)?);
    }
    if let Some(objects) = obj.get("objects").filter(|v| !v.is_null()) {
        msg.objects = decode_objects(objects)?;
    }
    if let Some(ext) = obj.get("objectsExternalRef").filter(|v| !v.is_null()) {
        msg.objects_external_ref = Some(blob_id(ext)?);
    }
    if let Some(packs) = obj.get("packs").filter(|v| !v.is_null()) {
        msg.packs = decode_packs(packs, obj.get("indexes"))?;
    }
    msg.head = obj
        .get("head")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .map(str::to_string);
    Ok(msg)
}

fn decode_refs(value: &Value) -> ProtocolResult<RefChanges> {
    let map = value
        .as_object()
        .ok_or_else(|| malformed("refs is not an object"))?;
    let mut refs = RefChanges::new();
    for (name, hash) in map {
        let hash = match hash.as_str() {
            Some(s) if !s.is_empty() => Some(GitHash::from_hex(s).map_err(malformed)?),
            _ => None,
        };
        refs.insert(name.clone(), hash);
    }
    Ok(refs)
}

pub(crate) fn decode_objects(value: &Value) -> ProtocolResult<ObjectMap> {
    let mut objects = ObjectMap::new();
    match value {
        Value::Object(map) => {
            for (sha1, desc) in map {
                let hash = GitHash::from_hex(sha1).map_err(malformed)?;
                objects.insert(hash, descriptor(desc)?);
            }
        }
        Value::Array(items) => {
            for item in items {
                let sha1 = item
                    .get("sha1")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("object entry without sha1"))?;
                let hash = GitHash::from_hex(sha1).map_err(malformed)?;
                objects.insert(hash, descriptor(item)?);
            }
        }
        _ => return Err(malformed("objects is neither a map nor an array")),
    }
    Ok(objects)
}

fn descriptor(value: &Value) -> ProtocolResult<ObjectDescriptor> {
    let kind: ObjectKind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("object entry without type"))?
        .parse()
        .map_err(malformed)?;
    let length = value
        .get("length")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("object entry without length"))?;
    let link = value
        .get("link")
        .or_else(|| value.get("key"))
        .ok_or_else(|| malformed("object entry without link"))?;
    Ok(ObjectDescriptor {
        kind,
        length,
        link: blob_id(link)?,
    })
}

fn decode_packs(packs: &Value, indexes: Option<&Value>) -> ProtocolResult<Vec<PackEntry>> {
    let packs = packs
        .as_array()
        .ok_or_else(|| malformed("packs is not an array"))?;
    let indexes = indexes.and_then(Value::as_array);

    packs
        .iter()
        .enumerate()
        .map(|(i, entry)| -> ProtocolResult<PackEntry> {
            if let Some(link) = entry.get("link") {
                let index = indexes
                    .and_then(|idx| idx.get(i))
                    .and_then(|idx| idx.get("link"))
                    .map(blob_id)
                    .transpose()?;
                Ok(PackEntry {
                    pack: blob_id(link)?,
                    index,
                })
            } else {
                let pack = entry
                    .get("pack")
                    .and_then(|p| p.get("link"))
                    .ok_or_else(|| malformed("pack entry without link"))?;
                let index = entry
                    .get("idx")
                    .and_then(|p| p.get("link"))
                    .map(blob_id)
                    .transpose()?;
                Ok(PackEntry {
                    pack: blob_id(pack)?,
                    index,
                })
            }
        })
        .collect()
}

fn blob_id(value: &Value) -> ProtocolResult<BlobId> {
    value
        .as_str()
        .ok_or_else(|| malformed("blob id is not a string"))?
        .parse()
        .map_err(malformed)
}

fn malformed(reason: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Malformed(reason.to_string())
}
