//! Incremental build pipeline.
//!
//! - `orchestrator` - mirrors directories, schedules categories, collects timings
//! - `transform` - category trait + pass-through collaborator
//! - `assets` - content-hash cached asset category
//! - `pool` - bounded concurrency for per-file asset work
//! - `mirror` - directory tree mirroring with name remapping

pub mod assets;
pub mod mirror;
pub mod orchestrator;
pub mod pool;
pub mod timings;
pub mod transform;

use std::path::PathBuf;

use rustc_hash::FxHashSet;

/// Deduplicated absolute paths that changed since the last build.
pub type ChangeSet = FxHashSet<PathBuf>;

pub use orchestrator::{BuildReport, Orchestrator};
