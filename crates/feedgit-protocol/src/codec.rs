use serde_json::{Map, Value};

use feedgit_types::RepoId;

use crate::error::{ProtocolError, ProtocolResult};
use crate::legacy;
use crate::message::{ObjectMap, UpdateMessage, REPO_TYPE, SCHEMA_VERSION, UPDATE_TYPE};

/// Encoding and decoding of feedgit records as log content.
pub struct UpdateCodec;

impl UpdateCodec {
    /// Encode an update as canonical log content.
    pub fn encode(msg: &UpdateMessage) -> ProtocolResult<Value> {
        let mut value =
            serde_json::to_value(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| ProtocolError::Serialization("update is not an object".into()))?;
        obj.insert("type".into(), Value::from(UPDATE_TYPE));
        obj.insert("schema".into(), Value::from(SCHEMA_VERSION));
        Ok(value)
    }

    /// Size in bytes of the encoded content, as the log measures it.
    pub fn encoded_len(msg: &UpdateMessage) -> ProtocolResult<usize> {
        let value = Self::encode(msg)?;
        serde_json::to_vec(&value)
            .map(|bytes| bytes.len())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode a `git-update` record of any schema version.
    pub fn decode(content: &Value) -> ProtocolResult<UpdateMessage> {
        let obj = content
            .as_object()
            .ok_or_else(|| ProtocolError::Malformed("record is not an object".into()))?;
        if type_tag(obj) != Some(UPDATE_TYPE) {
            return Err(ProtocolError::UnexpectedType(
                type_tag(obj).map(str::to_string),
            ));
        }
        match obj.get("schema") {
            None => legacy::decode_update(obj),
            Some(v) => match v.as_u64() {
                Some(SCHEMA_VERSION) => serde_json::from_value(content.clone())
                    .map_err(|e| ProtocolError::Deserialization(e.to_string())),
                Some(other) => Err(ProtocolError::UnsupportedSchema(other)),
                None => Err(ProtocolError::Malformed(format!("schema is not a number: {v}"))),
            },
        }
    }

    /// Returns `true` if `content` is an update record naming `repo`.
    ///
    /// Checks only the envelope; the body may still fail to decode.
    pub fn targets(content: &Value, repo: &RepoId) -> bool {
        let Some(obj) = content.as_object() else {
            return false;
        };
        type_tag(obj) == Some(UPDATE_TYPE)
            && obj
                .get("repo")
                .and_then(Value::as_str)
                .and_then(|s| RepoId::from_hex(s).ok())
                .is_some_and(|id| id == *repo)
    }

    /// Content of a repository creation record.
    pub fn repo_record() -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::from(REPO_TYPE));
        Value::Object(obj)
    }

    /// Returns `true` if `content` is a repository creation record.
    pub fn is_repo_record(content: &Value) -> bool {
        content
            .as_object()
            .is_some_and(|obj| type_tag(obj) == Some(REPO_TYPE))
    }

    /// Encode descriptors spilled out of an update into a standalone blob.
    pub fn encode_object_map(objects: &ObjectMap) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(objects).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode an overflow blob. Both the map form and the older array form
    /// are accepted.
    pub fn decode_object_map(data: &[u8]) -> ProtocolResult<ObjectMap> {
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        legacy::decode_objects(&value)
    }
}

fn type_tag(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgit_types::{BlobId, GitHash, ObjectKind};
    use serde_json::json;

    use crate::message::{ObjectDescriptor, PackEntry, RefChanges};

    fn repo() -> RepoId {
        RepoId::from_hex(&"11".repeat(32)).unwrap()
    }

    fn sample() -> UpdateMessage {
        let mut msg = UpdateMessage::new(repo());
        let mut refs = RefChanges::new();
        refs.insert("refs/heads/master".into(), Some(GitHash::from_bytes([2; 20])));
        refs.insert("refs/heads/gone".into(), None);
        msg.refs = Some(refs);
        msg.objects.insert(
            GitHash::from_bytes([2; 20]),
            ObjectDescriptor {
                kind: ObjectKind::Commit,
                length: 180,
                link: BlobId::from_hash([3; 32]),
            },
        );
        msg.packs.push(PackEntry {
            pack: BlobId::from_hash([4; 32]),
            index: Some(BlobId::from_hash([5; 32])),
        });
        msg.head = Some("refs/heads/master".into());
        msg
    }

    #[test]
    fn canonical_encoding_is_tagged_and_versioned() {
        let value = UpdateCodec::encode(&sample()).unwrap();
        assert_eq!(value["type"], UPDATE_TYPE);
        assert_eq!(value["schema"], SCHEMA_VERSION);
        assert!(UpdateCodec::targets(&value, &repo()));
        assert_eq!(UpdateCodec::decode(&value).unwrap(), sample());
    }

    #[test]
    fn encoded_len_matches_serialized_bytes() {
        let msg = sample();
        let value = UpdateCodec::encode(&msg).unwrap();
        assert_eq!(
            UpdateCodec::encoded_len(&msg).unwrap(),
            serde_json::to_vec(&value).unwrap().len()
        );
    }

    #[test]
    fn targets_rejects_other_repos_and_types() {
        let value = UpdateCodec::encode(&sample()).unwrap();
        let other = RepoId::from_hex(&"22".repeat(32)).unwrap();
        assert!(!UpdateCodec::targets(&value, &other));
        assert!(!UpdateCodec::targets(&UpdateCodec::repo_record(), &repo()));
        assert!(!UpdateCodec::targets(&json!("string"), &repo()));
    }

    #[test]
    fn decode_rejects_wrong_type_and_future_schema() {
        assert!(matches!(
            UpdateCodec::decode(&json!({"type": "post"})),
            Err(ProtocolError::UnexpectedType(Some(t))) if t == "post"
        ));
        let mut value = UpdateCodec::encode(&sample()).unwrap();
        value["schema"] = json!(7);
        assert!(matches!(
            UpdateCodec::decode(&value),
            Err(ProtocolError::UnsupportedSchema(7))
        ));
    }

    #[test]
    fn repo_record_is_recognized() {
        let record = UpdateCodec::repo_record();
        assert!(UpdateCodec::is_repo_record(&record));
        assert!(!UpdateCodec::is_repo_record(&json!({"type": "git-update"})));
    }

    #[test]
    fn object_map_blob_roundtrip() {
        let objects = sample().objects;
        let blob = UpdateCodec::encode_object_map(&objects).unwrap();
        assert_eq!(UpdateCodec::decode_object_map(&blob).unwrap(), objects);
        assert!(UpdateCodec::decode_object_map(b"not json").is_err());
    }
}
