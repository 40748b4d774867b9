//! Freshness detection: content-hash (blake3) for cached assets, mtime for
//! pass-through copies.

mod hash;
mod mtime;

pub use hash::{ContentHash, compute_file_hash};
pub use mtime::needs_copy;
