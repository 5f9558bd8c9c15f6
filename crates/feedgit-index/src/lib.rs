//! Object and pack indexes for feedgit repositories.
//!
//! The [`ObjectIndex`] maps git object ids to descriptors of where their
//! content lives. While history is still being replayed a miss is not yet
//! final, so lookups queue until the object shows up or replay ends.
//! [`PackRegistry`] keeps packs discovered in history apart from packs
//! received live. [`load_overflow`] reads descriptor maps that an update
//! spilled into a blob.

pub mod error;
pub mod object_index;
pub mod overflow;
pub mod packs;

pub use error::{IndexError, IndexResult};
pub use object_index::{Lookup, ObjectIndex, Probe, Resolution};
pub use overflow::load_overflow;
pub use packs::{PackPartition, PackRegistry};
