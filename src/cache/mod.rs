//! Content-hash cache for asset transforms.
//!
//! Keys are paths relative to the asset root with `/` separators. An entry
//! records the digest of the source that was processed and the digest of the
//! artifact it produced, so a tampered or missing output is detected even when
//! the source is unchanged.

mod entry;
mod store;

pub use entry::Decision;
pub use store::AssetCache;

/// Default cache file name (project root)
pub const CACHE_FILE: &str = ".assetcache.json";
