use std::path::Path;

use serde::{Deserialize, Serialize};

use feedgit_log::DEFAULT_MAX_ENTRY_SIZE;

use crate::error::{RepoError, RepoResult};

/// Per-handle synchronization settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Keep following the owner's feed after history replay.
    pub live: bool,
    /// Largest encoded update this handle will try to publish, in bytes.
    /// The log's own limit still applies if it is lower.
    pub max_entry_size: usize,
    /// Memory budget for cached commit, tree and tag content. 0 disables
    /// caching.
    pub small_object_cache_bytes: usize,
    /// Objects or packs uploaded at once within one transaction.
    pub object_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            live: false,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            small_object_cache_bytes: 16 * 1024 * 1024,
            object_concurrency: 16,
        }
    }
}

impl SyncConfig {
    /// Default settings with live tailing turned on.
    pub fn live() -> Self {
        Self {
            live: true,
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> RepoResult<Self> {
        toml::from_str(s).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string(self).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
