//! Reference state for feedgit repositories.
//!
//! - [`RefLedger`]: ref name to git hash, merged first-write-wins while
//!   replaying history and overwritten while tailing. Deleted refs are
//!   hidden from readers but remembered for compare-and-swap checks.
//! - [`HeadResolver`]: the symbolic HEAD, with a default-branch fallback and
//!   a FIFO queue of callers waiting for it.
//! - [`names`]: ref name validation for locally proposed updates.

pub mod error;
pub mod head;
pub mod ledger;
pub mod names;

pub use error::{RefError, Result};
pub use head::{HeadResolver, HeadWait, DEFAULT_HEAD};
pub use ledger::{RefLedger, RefOp};
pub use names::validate_ref_name;
