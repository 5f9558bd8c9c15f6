//! Append-only log collaborator for feedgit.
//!
//! Every feed is a single-writer, append-only sequence of JSON records. A
//! repository's state is derived from the records its owner has published
//! on their feed. This crate defines the boundary feedgit needs from such a
//! log ([`UpdateLog`]) and two implementations:
//!
//! - [`InMemoryNetwork`] / [`InMemoryLog`]: many feeds in one process, with
//!   live tail fan-out. Used for tests and embedding.
//! - [`JsonlLog`]: the in-memory log persisted as one JSON line per entry.
//!
//! # Ordering
//!
//! [`UpdateLog::replay_history`] yields a feed's entries newest first.
//! [`UpdateLog::tail`] yields entries in publish order, starting with every
//! entry whose timestamp is at or after `since`, then each new entry as it is
//! published.

pub mod entry;
pub mod error;
pub mod jsonl;
pub mod memory;
pub mod traits;

pub use entry::LogEntry;
pub use error::{LogError, LogResult};
pub use jsonl::JsonlLog;
pub use memory::{InMemoryLog, InMemoryNetwork};
pub use traits::{EntryStream, UpdateLog};

/// Default maximum encoded size of one entry's content, in bytes.
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 8192;
