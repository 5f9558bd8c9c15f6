use serde::{Deserialize, Serialize};
use serde_json::Value;

use feedgit_crypto::ContentHasher;
use feedgit_types::{EntryId, FeedId, Timestamp};

use crate::error::LogResult;

/// One published record on a feed.
///
/// The key is a digest over the author, sequence number, timestamp and
/// content, so it is unique per entry and verifiable by anyone holding it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: EntryId,
    pub author: FeedId,
    /// Position on the author's feed, starting at 1.
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub content: Value,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    author: &'a FeedId,
    sequence: u64,
    timestamp: Timestamp,
    content: &'a Value,
}

impl LogEntry {
    /// Build an entry, deriving its key.
    pub fn new(
        author: FeedId,
        sequence: u64,
        timestamp: Timestamp,
        content: Value,
    ) -> LogResult<Self> {
        let key = Self::compute_key(&author, sequence, timestamp, &content)?;
        Ok(Self {
            key,
            author,
            sequence,
            timestamp,
            content,
        })
    }

    fn compute_key(
        author: &FeedId,
        sequence: u64,
        timestamp: Timestamp,
        content: &Value,
    ) -> LogResult<EntryId> {
        let material = serde_json::to_vec(&KeyMaterial {
            author,
            sequence,
            timestamp,
            content,
        })?;
        Ok(ContentHasher::entry_id(&material))
    }

    /// Returns `true` if the key matches the entry's contents.
    pub fn verify_key(&self) -> bool {
        Self::compute_key(&self.author, self.sequence, self.timestamp, &self.content)
            .map(|k| k == self.key)
            .unwrap_or(false)
    }

    /// The `type` tag of the content, if it has one.
    pub fn content_type(&self) -> Option<&str> {
        self.content.get("type").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_deterministic_and_verifiable() {
        let author = FeedId::from_raw([3u8; 32]);
        let ts = Timestamp::from_millis(10);
        let a = LogEntry::new(author, 1, ts, json!({"type": "git-repo"})).unwrap();
        let b = LogEntry::new(author, 1, ts, json!({"type": "git-repo"})).unwrap();
        assert_eq!(a.key, b.key);
        assert!(a.verify_key());
        assert_eq!(a.content_type(), Some("git-repo"));
    }

    #[test]
    fn tampered_content_fails_verification() {
        let author = FeedId::from_raw([3u8; 32]);
        let mut entry =
            LogEntry::new(author, 2, Timestamp::from_millis(5), json!({"n": 1})).unwrap();
        entry.content = json!({"n": 2});
        assert!(!entry.verify_key());
        assert_eq!(entry.content_type(), None);
    }

    #[test]
    fn sequence_changes_key() {
        let author = FeedId::from_raw([1u8; 32]);
        let ts = Timestamp::from_millis(1);
        let a = LogEntry::new(author, 1, ts, json!(null)).unwrap();
        let b = LogEntry::new(author, 2, ts, json!(null)).unwrap();
        assert_ne!(a.key, b.key);
    }
}
