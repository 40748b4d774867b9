//! Cache record and per-file decision.

use serde::{Deserialize, Serialize};

use crate::freshness::ContentHash;

/// Digests recorded after an asset was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// blake3 hex of the source at processing time
    pub source_digest: String,
    /// blake3 hex of the artifact written to the output tree
    pub output_digest: String,
}

impl CacheEntry {
    pub fn new(source: ContentHash, output: ContentHash) -> Self {
        Self {
            source_digest: source.to_hex(),
            output_digest: output.to_hex(),
        }
    }

    pub fn source_matches(&self, digest: ContentHash) -> bool {
        ContentHash::from_hex(&self.source_digest) == Some(digest)
    }

    pub fn output_matches(&self, digest: ContentHash) -> bool {
        ContentHash::from_hex(&self.output_digest) == Some(digest)
    }
}

/// What the asset pass should do with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Source and artifact both match the cache
    Skip,
    /// (Re)process; carries the freshly computed source digest
    Process { source_digest: ContentHash },
    /// Source is gone: drop the entry and the artifact
    Remove,
}
