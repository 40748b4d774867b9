//! Cached asset category.
//!
//! Every candidate file goes through [`AssetCache::decide`]; processing runs
//! on the bounded pool. After per-file work the cache is reconciled against
//! the source tree and saved, whether or not some files failed.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use super::ChangeSet;
use super::pool::ConcurrencyPool;
use super::transform::{Transform, TransformFuture, TransformStats, collect_files};
use crate::cache::{AssetCache, Decision};
use crate::core::{AssetKind, Category};
use crate::freshness::compute_file_hash;

pub type ProcessFuture<'a> = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>>;

/// Produces the output artifact for one asset.
///
/// Image and video re-encoding plug in here; the default copies bytes.
pub trait AssetProcessor: Send + Sync {
    fn process<'a>(&'a self, kind: AssetKind, source: &'a Path, output: &'a Path) -> ProcessFuture<'a>;
}

/// Copies the source into place through a temp file so a reader never sees
/// a half-written artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyProcessor;

impl AssetProcessor for CopyProcessor {
    fn process<'a>(&'a self, _kind: AssetKind, source: &'a Path, output: &'a Path) -> ProcessFuture<'a> {
        Box::pin(async move {
            if let Some(parent) = output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut tmp = output.as_os_str().to_owned();
            tmp.push(".tmp");
            let tmp = PathBuf::from(tmp);
            tokio::fs::copy(source, &tmp).await?;
            tokio::fs::rename(&tmp, output).await
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    Removed,
    Skipped,
    Untracked,
}

pub struct AssetPipeline {
    cache: Arc<AssetCache>,
    pool: ConcurrencyPool,
    processor: Arc<dyn AssetProcessor>,
}

impl AssetPipeline {
    pub fn new(cache: Arc<AssetCache>, concurrency: usize) -> Self {
        Self {
            cache,
            pool: ConcurrencyPool::new(concurrency),
            processor: Arc::new(CopyProcessor),
        }
    }

    #[cfg(test)]
    pub fn with_processor(mut self, processor: Arc<dyn AssetProcessor>) -> Self {
        self.processor = processor;
        self
    }

    #[cfg(test)]
    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    /// Cache keys to visit: changed asset files, or the whole asset tree.
    async fn candidates(&self, changed: Option<&ChangeSet>) -> Result<Vec<String>> {
        let cache = &self.cache;
        let mut keys: Vec<String> = match changed {
            Some(changed) => changed
                .iter()
                .filter(|p| AssetKind::from_path(p).is_some())
                .filter_map(|p| cache.key_for(p))
                .collect(),
            None => {
                let root = cache.source_root().to_path_buf();
                let files = tokio::task::spawn_blocking(move || {
                    collect_files(&root, |p| AssetKind::from_path(p).is_some())
                })
                .await
                .context("asset walk panicked")?;
                files.iter().filter_map(|p| cache.key_for(p)).collect()
            }
        };
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    pub async fn process(&self, changed: Option<&ChangeSet>) -> Result<TransformStats> {
        let keys = self.candidates(changed).await?;
        let incremental = changed.is_some();

        let handles: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let cache = Arc::clone(&self.cache);
                let processor = Arc::clone(&self.processor);
                let task_key = key.clone();
                let handle = self
                    .pool
                    .submit(async move { process_one(&cache, processor.as_ref(), &task_key).await });
                (key, handle)
            })
            .collect();

        let mut stats = TransformStats::default();
        for (key, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    match outcome {
                        Outcome::Processed => stats.written += 1,
                        Outcome::Removed => stats.removed += 1,
                        Outcome::Skipped => stats.skipped += 1,
                        Outcome::Untracked => {}
                    }
                    if incremental {
                        match outcome {
                            Outcome::Processed => crate::log!("assets"; "{} processed", key),
                            Outcome::Removed => crate::log!("assets"; "{} removed", key),
                            _ => {}
                        }
                    }
                }
                Ok(Err(e)) => {
                    crate::log!("error"; "asset {}: {:#}", key, e);
                    stats.failed += 1;
                }
                Err(e) => {
                    crate::log!("error"; "asset {}: {}", key, e);
                    stats.failed += 1;
                }
            }
        }

        stats.removed += self.cache.reconcile().await;
        self.cache.save().await.context("failed to save asset cache")?;

        crate::debug!("assets"; "{} ({} cached)", stats, self.cache.len());
        if stats.failed > 0 {
            bail!("{} assets failed", stats.failed);
        }
        Ok(stats)
    }
}

async fn process_one(cache: &AssetCache, processor: &dyn AssetProcessor, key: &str) -> Result<Outcome> {
    match cache.decide(key).await? {
        Decision::Skip => Ok(Outcome::Skipped),
        Decision::Remove => Ok(if cache.evict(key).await {
            Outcome::Removed
        } else {
            Outcome::Untracked
        }),
        Decision::Process { source_digest } => {
            let source = cache.source_path(key);
            let output = cache.output_path(key);
            let kind = AssetKind::from_path(&source).unwrap_or(AssetKind::Generic);

            processor
                .process(kind, &source, &output)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            let output_digest = compute_file_hash(&output)
                .await
                .with_context(|| format!("failed to hash {}", output.display()))?;

            cache.commit(key, source_digest, output_digest);
            Ok(Outcome::Processed)
        }
    }
}

impl Transform for AssetPipeline {
    fn category(&self) -> Category {
        Category::Asset
    }

    fn run<'a>(&'a self, changed: Option<&'a ChangeSet>) -> TransformFuture<'a> {
        Box::pin(self.process(changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Project {
        _dir: TempDir,
        root: PathBuf,
    }

    impl Project {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            fs::create_dir_all(root.join("assets/img")).unwrap();
            Self { _dir: dir, root }
        }

        fn assets(&self) -> PathBuf {
            self.root.join("assets")
        }

        fn pipeline(&self) -> AssetPipeline {
            let cache = AssetCache::load(
                self.root.join(".assetcache.json"),
                &self.assets(),
                &self.root.join("dist/assets"),
            );
            AssetPipeline::new(Arc::new(cache), 4)
        }
    }

    #[tokio::test]
    async fn test_full_pass_is_idempotent() {
        let project = Project::new();
        fs::write(project.assets().join("img/a.png"), b"a").unwrap();
        fs::write(project.assets().join("img/b.svg"), b"<svg/>").unwrap();
        fs::write(project.assets().join("notes.md"), b"not an asset").unwrap();
        let pipeline = project.pipeline();

        let first = pipeline.process(None).await.unwrap();
        assert_eq!(first.written, 2);
        assert!(project.root.join("dist/assets/img/a.png").exists());
        assert!(!project.root.join("dist/assets/notes.md").exists());

        let second = pipeline.process(None).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.skipped, 2);
    }

    #[tokio::test]
    async fn test_cache_survives_restart() {
        let project = Project::new();
        fs::write(project.assets().join("img/a.png"), b"a").unwrap();
        project.pipeline().process(None).await.unwrap();

        let stats = project.pipeline().process(None).await.unwrap();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_incremental_change_processes_and_commits() {
        let project = Project::new();
        let pipeline = project.pipeline();
        let source = project.assets().join("img/a.png");
        fs::write(&source, b"new image").unwrap();

        let changed = ChangeSet::from_iter([source]);
        let stats = pipeline.process(Some(&changed)).await.unwrap();
        assert_eq!(stats.written, 1);

        let entry = pipeline.cache().get("img/a.png").unwrap();
        let output = project.root.join("dist/assets/img/a.png");
        let digest = compute_file_hash(&output).await.unwrap();
        assert!(entry.output_matches(digest));
    }

    #[tokio::test]
    async fn test_deleted_directory_is_reconciled() {
        let project = Project::new();
        fs::write(project.assets().join("img/a.png"), b"a").unwrap();
        fs::write(project.assets().join("img/b.png"), b"b").unwrap();
        let pipeline = project.pipeline();
        pipeline.process(None).await.unwrap();

        let img_dir = project.assets().join("img");
        fs::remove_dir_all(&img_dir).unwrap();
        // The watcher only reports the directory itself
        let changed = ChangeSet::from_iter([img_dir]);
        let stats = pipeline.process(Some(&changed)).await.unwrap();

        assert_eq!(stats.removed, 2);
        assert_eq!(pipeline.cache().len(), 0);
        assert!(!project.root.join("dist/assets/img/a.png").exists());
        assert!(!project.root.join("dist/assets/img/b.png").exists());
    }

    #[tokio::test]
    async fn test_failed_processor_reports_error() {
        struct Broken;
        impl AssetProcessor for Broken {
            fn process<'a>(&'a self, _: AssetKind, _: &'a Path, _: &'a Path) -> ProcessFuture<'a> {
                Box::pin(async { Err(std::io::Error::other("encoder crashed")) })
            }
        }

        let project = Project::new();
        fs::write(project.assets().join("img/a.png"), b"a").unwrap();
        let pipeline = project.pipeline().with_processor(Arc::new(Broken));

        assert!(pipeline.process(None).await.is_err());
        assert!(pipeline.cache().get("img/a.png").is_none());
        // Cache file is still written after a failed pass
        assert!(project.root.join(".assetcache.json").exists());
    }
}
