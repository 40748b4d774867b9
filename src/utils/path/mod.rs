//! Path utilities.
//!
//! Pure functions for path manipulation, no side effects.

pub mod fs;

pub use fs::{join_key, normalize_path, rel_key};
