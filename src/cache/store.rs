//! Persistent asset cache.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use super::entry::{CacheEntry, Decision};
use crate::freshness::{ContentHash, compute_file_hash};
use crate::utils::path::{join_key, rel_key};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to access `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode asset cache")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Asset cache bound to one source root, one output root and one file.
///
/// The lock is only held for map operations, never across an await.
#[derive(Debug)]
pub struct AssetCache {
    source_root: PathBuf,
    output_root: PathBuf,
    file: PathBuf,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl AssetCache {
    /// Load the cache file, starting empty when it is absent or unreadable.
    pub fn load(file: impl Into<PathBuf>, source_root: &Path, output_root: &Path) -> Self {
        let file = file.into();
        let entries = match std::fs::read_to_string(&file) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                crate::log!("cache"; "ignoring corrupt {}: {}", file.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                crate::log!("cache"; "cannot read {}: {}", file.display(), e);
                BTreeMap::new()
            }
        };
        crate::debug!("cache"; "loaded {} entries from {}", entries.len(), file.display());

        Self {
            source_root: source_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            file,
            entries: Mutex::new(entries),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Cache key for an absolute source path, `None` outside the asset root.
    pub fn key_for(&self, source: &Path) -> Option<String> {
        rel_key(&self.source_root, source)
    }

    pub fn source_path(&self, key: &str) -> PathBuf {
        join_key(&self.source_root, key)
    }

    pub fn output_path(&self, key: &str) -> PathBuf {
        join_key(&self.output_root, key)
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Decide what to do with the asset at `key`.
    ///
    /// Not-found while hashing counts as a deletion racing the build.
    pub async fn decide(&self, key: &str) -> Result<Decision, CacheError> {
        let source = self.source_path(key);
        let meta = match tokio::fs::metadata(&source).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Decision::Remove),
            Err(e) => return Err(CacheError::io(&source, e)),
        };
        if meta.is_dir() {
            return Ok(Decision::Skip);
        }

        let source_digest = match compute_file_hash(&source).await {
            Ok(digest) => digest,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Decision::Remove),
            Err(e) => return Err(CacheError::io(&source, e)),
        };

        if let Some(entry) = self.get(key)
            && entry.source_matches(source_digest)
            && let Ok(output_digest) = compute_file_hash(self.output_path(key)).await
            && entry.output_matches(output_digest)
        {
            return Ok(Decision::Skip);
        }

        Ok(Decision::Process { source_digest })
    }

    /// Record a processed asset.
    pub fn commit(&self, key: &str, source: ContentHash, output: ContentHash) {
        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry::new(source, output));
    }

    /// Drop the entry and, best effort, its artifact.
    ///
    /// Returns whether an entry existed.
    pub async fn evict(&self, key: &str) -> bool {
        let existed = self.entries.lock().remove(key).is_some();
        let output = self.output_path(key);
        match tokio::fs::remove_file(&output).await {
            Ok(()) => crate::debug!("cache"; "removed {}", output.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => crate::log!("cache"; "cannot remove {}: {}", output.display(), e),
        }
        existed
    }

    /// Evict every entry whose source no longer exists. Returns the count.
    pub async fn reconcile(&self) -> usize {
        let keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        let mut evicted = 0;

        for key in keys {
            let source = self.source_path(&key);
            match tokio::fs::metadata(&source).await {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.evict(&key).await;
                    evicted += 1;
                }
                Err(e) => crate::log!("cache"; "cannot check {}: {}", source.display(), e),
            }
        }

        evicted
    }

    /// Write the cache file atomically (temp file + rename).
    pub async fn save(&self) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(&*self.entries.lock())?;

        if let Some(parent) = self.file.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io(parent, e))?;
        }

        let tmp = self.file.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CacheError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.file)
            .await
            .map_err(|e| CacheError::io(&self.file, e))?;

        crate::debug!("cache"; "saved {} entries", self.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            fs::create_dir_all(root.join("assets/img")).unwrap();
            fs::create_dir_all(root.join("dist/assets")).unwrap();
            Self { _dir: dir, root }
        }

        fn cache(&self) -> AssetCache {
            AssetCache::load(
                self.root.join(".assetcache.json"),
                &self.root.join("assets"),
                &self.root.join("dist/assets"),
            )
        }

        fn write_source(&self, key: &str, content: &[u8]) {
            fs::write(self.root.join("assets").join(key), content).unwrap();
        }

        /// Copy the source into the output tree and commit it.
        async fn process(&self, cache: &AssetCache, key: &str) {
            let Decision::Process { source_digest } = cache.decide(key).await.unwrap() else {
                panic!("expected Process for {key}");
            };
            let output = cache.output_path(key);
            fs::create_dir_all(output.parent().unwrap()).unwrap();
            fs::copy(cache.source_path(key), &output).unwrap();
            let output_digest = compute_file_hash(&output).await.unwrap();
            cache.commit(key, source_digest, output_digest);
        }
    }

    #[tokio::test]
    async fn test_new_file_is_processed_then_skipped() {
        let fx = Fixture::new();
        let cache = fx.cache();
        fx.write_source("img/a.png", b"png bytes");

        fx.process(&cache, "img/a.png").await;
        assert_eq!(cache.decide("img/a.png").await.unwrap(), Decision::Skip);

        let entry = cache.get("img/a.png").unwrap();
        let on_disk = compute_file_hash(cache.output_path("img/a.png")).await.unwrap();
        assert!(entry.output_matches(on_disk));
    }

    #[tokio::test]
    async fn test_changed_source_is_reprocessed() {
        let fx = Fixture::new();
        let cache = fx.cache();
        fx.write_source("img/a.png", b"v1");
        fx.process(&cache, "img/a.png").await;

        fx.write_source("img/a.png", b"v2");
        let decision = cache.decide("img/a.png").await.unwrap();
        assert_eq!(
            decision,
            Decision::Process {
                source_digest: ContentHash::of(b"v2")
            }
        );
    }

    #[tokio::test]
    async fn test_tampered_or_missing_output_is_reprocessed() {
        let fx = Fixture::new();
        let cache = fx.cache();
        fx.write_source("img/a.png", b"v1");
        fx.process(&cache, "img/a.png").await;

        fs::write(cache.output_path("img/a.png"), b"edited by hand").unwrap();
        assert!(matches!(
            cache.decide("img/a.png").await.unwrap(),
            Decision::Process { .. }
        ));

        fs::remove_file(cache.output_path("img/a.png")).unwrap();
        assert!(matches!(
            cache.decide("img/a.png").await.unwrap(),
            Decision::Process { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_source_is_removed() {
        let fx = Fixture::new();
        let cache = fx.cache();
        assert_eq!(cache.decide("img/ghost.png").await.unwrap(), Decision::Remove);
    }

    #[tokio::test]
    async fn test_directory_is_skipped() {
        let fx = Fixture::new();
        let cache = fx.cache();
        assert_eq!(cache.decide("img").await.unwrap(), Decision::Skip);
    }

    #[tokio::test]
    async fn test_evict_removes_entry_and_output() {
        let fx = Fixture::new();
        let cache = fx.cache();
        fx.write_source("img/a.png", b"v1");
        fx.process(&cache, "img/a.png").await;

        assert!(cache.evict("img/a.png").await);
        assert!(cache.get("img/a.png").is_none());
        assert!(!cache.output_path("img/a.png").exists());
        // Second eviction is a no-op
        assert!(!cache.evict("img/a.png").await);
    }

    #[tokio::test]
    async fn test_reconcile_after_directory_delete() {
        let fx = Fixture::new();
        let cache = fx.cache();
        fs::create_dir_all(fx.root.join("assets/fonts")).unwrap();
        fx.write_source("img/a.png", b"a");
        fx.write_source("img/b.png", b"b");
        fx.write_source("fonts/inter.woff2", b"font");
        for key in ["img/a.png", "img/b.png", "fonts/inter.woff2"] {
            fx.process(&cache, key).await;
        }

        fs::remove_dir_all(fx.root.join("assets/img")).unwrap();
        assert_eq!(cache.reconcile().await, 2);

        assert_eq!(cache.len(), 1);
        assert!(cache.get("fonts/inter.woff2").is_some());
        assert!(!cache.output_path("img/a.png").exists());
        assert!(!cache.output_path("img/b.png").exists());
        assert!(cache.output_path("fonts/inter.woff2").exists());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let fx = Fixture::new();
        let cache = fx.cache();
        fx.write_source("img/a.png", b"v1");
        fx.process(&cache, "img/a.png").await;
        cache.save().await.unwrap();

        let text = fs::read_to_string(fx.root.join(".assetcache.json")).unwrap();
        assert!(text.contains("\"img/a.png\""));
        assert!(text.contains("sourceDigest"));
        assert!(!fx.root.join(".assetcache.json.tmp").exists());

        let reloaded = fx.cache();
        assert_eq!(reloaded.get("img/a.png"), cache.get("img/a.png"));
        assert_eq!(reloaded.decide("img/a.png").await.unwrap(), Decision::Skip);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let fx = Fixture::new();
        fs::write(fx.root.join(".assetcache.json"), "{ not json").unwrap();
        assert_eq!(fx.cache().len(), 0);
    }

    #[test]
    fn test_key_for() {
        let fx = Fixture::new();
        let cache = fx.cache();
        let path = fx.root.join("assets/img/a.png");
        assert_eq!(cache.key_for(&path).as_deref(), Some("img/a.png"));
        assert_eq!(cache.key_for(&fx.root.join("src/index.html")), None);
    }
}
