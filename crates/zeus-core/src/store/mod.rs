//! Atomic file store: the primitives every other component depends on.
//!
//! All filesystem mutation in the bus goes through this module. The design
//! assumes nothing of the filesystem beyond atomic intra-directory rename,
//! create-new, readdir and unlink; there are no in-process locks and no
//! lockfiles. Coordination between processes is entirely rename semantics:
//!
//! - [`write_json_atomic`] commits via write-to-temp + rename in the same
//!   directory, so no reader ever observes a partially-written record.
//! - [`claim_move`] renames a work item between sibling directories
//!   (`new/` -> `inflight/`, `new/` -> `processing/`); losing a race is a
//!   normal `Ok(false)`, not an error.
//!
//! Paths passed in must already be absolute and canonical; the store does not
//! interpret them.

mod atomic;
mod error;

pub use atomic::{
    claim_move, ensure_dir, list_sorted, read_json, remove_stale_temps, unlink, write_json_atomic,
    write_marker,
};
pub use error::StoreError;
