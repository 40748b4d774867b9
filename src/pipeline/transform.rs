//! Transform categories and the built-in pass-through collaborator.
//!
//! A transform owns one [`Category`]: given the changed paths (or `None` for
//! a full build) it writes artifacts into the output tree. Real compilers
//! (templating, bundling, stylesheet compilation) plug in behind the same
//! trait; the pass-through variant copies matched files so a project works
//! out of the box.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result, bail};
use jwalk::WalkDir;

use super::ChangeSet;
use super::mirror::DirRemap;
use crate::core::Category;
use crate::freshness::needs_copy;

pub type TransformFuture<'a> = Pin<Box<dyn Future<Output = Result<TransformStats>> + Send + 'a>>;

/// Per-category counters for one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub written: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TransformStats {
    pub fn is_noop(&self) -> bool {
        self.written == 0 && self.removed == 0 && self.failed == 0
    }
}

impl std::fmt::Display for TransformStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} written, {} removed, {} skipped, {} failed",
            self.written, self.removed, self.skipped, self.failed
        )
    }
}

pub trait Transform: Send + Sync {
    fn category(&self) -> Category;

    /// Produce artifacts for `changed` (`None` = everything).
    fn run<'a>(&'a self, changed: Option<&'a ChangeSet>) -> TransformFuture<'a>;
}

/// Copies every source file of one category into the mirrored output tree.
pub struct PassthroughTransform {
    category: Category,
    source_root: PathBuf,
    output_root: PathBuf,
    remap: DirRemap,
}

impl PassthroughTransform {
    pub fn new(category: Category, source_root: &Path, output_root: &Path, remap: DirRemap) -> Self {
        Self {
            category,
            source_root: source_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            remap,
        }
    }

    /// Changed paths this transform is responsible for.
    fn changed_targets(&self, changed: &ChangeSet) -> Vec<PathBuf> {
        changed
            .iter()
            .filter(|p| p.starts_with(&self.source_root) && self.category.matches(p))
            .cloned()
            .collect()
    }

    async fn sync_one(&self, source: &Path, stats: &mut TransformStats) -> Result<()> {
        let Some(output) = self
            .remap
            .output_path(&self.source_root, &self.output_root, source)
        else {
            return Ok(());
        };

        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            match tokio::fs::remove_file(&output).await {
                Ok(()) => stats.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("remove {}", output.display())),
            }
            return Ok(());
        }

        if !needs_copy(source, &output) {
            stats.skipped += 1;
            return Ok(());
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::copy(source, &output)
            .await
            .with_context(|| format!("copy {} -> {}", source.display(), output.display()))?;
        stats.written += 1;
        Ok(())
    }
}

impl Transform for PassthroughTransform {
    fn category(&self) -> Category {
        self.category
    }

    fn run<'a>(&'a self, changed: Option<&'a ChangeSet>) -> TransformFuture<'a> {
        Box::pin(async move {
            let targets = match changed {
                Some(changed) => self.changed_targets(changed),
                None => {
                    let root = self.source_root.clone();
                    let category = self.category;
                    tokio::task::spawn_blocking(move || collect_files(&root, |p| category.matches(p)))
                        .await
                        .context("file walk panicked")?
                }
            };

            let mut stats = TransformStats::default();
            for source in &targets {
                if let Err(e) = self.sync_one(source, &mut stats).await {
                    crate::log!("error"; "{}: {:#}", self.category, e);
                    stats.failed += 1;
                }
            }

            crate::debug!("build"; "{}: {}", self.category, stats);
            if stats.failed > 0 {
                bail!("{} of {} files failed", stats.failed, targets.len());
            }
            Ok(stats)
        })
    }
}

/// All regular files under `dir` accepted by `filter`. Empty when `dir` is missing.
pub fn collect_files(dir: &Path, filter: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|p| filter(p))
        .collect()
}
