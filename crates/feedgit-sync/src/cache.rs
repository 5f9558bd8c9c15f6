use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use feedgit_types::BlobId;

/// Bounded in-memory cache of small object content, scoped to one handle.
///
/// Entries are evicted oldest-inserted first once the byte budget is
/// exceeded. Content larger than the whole budget is never cached.
#[derive(Debug)]
pub(crate) struct ObjectCache {
    budget: usize,
    used: usize,
    order: VecDeque<BlobId>,
    entries: HashMap<BlobId, Bytes>,
}

impl ObjectCache {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.budget > 0
    }

    pub(crate) fn get(&self, id: &BlobId) -> Option<Bytes> {
        self.entries.get(id).cloned()
    }

    pub(crate) fn insert(&mut self, id: BlobId, data: Bytes) {
        if data.len() > self.budget || self.entries.contains_key(&id) {
            return;
        }
        while self.used + data.len() > self.budget {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.used -= evicted.len();
            }
        }
        self.used += data.len();
        self.order.push_back(id);
        self.entries.insert(id, data);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn used_bytes(&self) -> usize {
        self.used
    }
}
