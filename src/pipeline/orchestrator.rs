//! Build orchestration.
//!
//! ```text
//! build(changed)
//!   ├── mirror source dirs into output (scss -> css, ts -> js)
//!   ├── schedule(changed) -> categories
//!   ├── spawn one task per category ──┐
//!   │                                 ├── await all, log failures
//!   ├── reconcile asset cache ◄───────┘  (if the asset category did not run)
//!   └── timings
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;

use super::ChangeSet;
use super::assets::AssetPipeline;
use super::mirror::{DirRemap, mirror_tree};
use super::timings::Timings;
use super::transform::{PassthroughTransform, Transform, TransformStats};
use crate::cache::AssetCache;
use crate::config::ProjectConfig;
use crate::core::Category;

/// Outcome of one build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub timings: Timings,
    /// Categories that returned an error or panicked
    pub failed: Vec<Category>,
    pub stats: FxHashMap<Category, TransformStats>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Categories that actually ran, failed ones included.
    pub fn ran(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.timings.get(*c).is_some())
            .collect()
    }
}

/// Categories a change set needs. `None` schedules everything.
///
/// Anything under `asset_root` schedules the asset category, extension or
/// not: a removed directory only shows up as its own path.
pub fn schedule(changed: Option<&ChangeSet>, asset_root: Option<&Path>) -> Vec<Category> {
    let Some(changed) = changed else {
        return Category::ALL.to_vec();
    };
    let under_assets = |p: &Path| asset_root.is_some_and(|root| p.starts_with(root));
    Category::ALL
        .into_iter()
        .filter(|category| {
            changed
                .iter()
                .any(|p| category.matches(p) || (*category == Category::Asset && under_assets(p)))
        })
        .collect()
}

pub struct Orchestrator {
    source_root: PathBuf,
    output_root: PathBuf,
    remap: DirRemap,
    transforms: FxHashMap<Category, Arc<dyn Transform>>,
    asset_cache: Option<Arc<AssetCache>>,
}

impl Orchestrator {
    /// An orchestrator with no transforms registered.
    pub fn new(source_root: PathBuf, output_root: PathBuf, remap: DirRemap) -> Self {
        Self {
            source_root,
            output_root,
            remap,
            transforms: FxHashMap::default(),
            asset_cache: None,
        }
    }

    /// Pass-through transforms for markup, scripts and styles plus the
    /// cached asset pipeline. Loads the asset cache.
    pub fn from_config(config: &ProjectConfig) -> Self {
        let source = config.source_dir();
        let output = config.output_dir();
        let remap = DirRemap::new(config.build.remap.clone());

        let cache = Arc::new(AssetCache::load(
            config.cache_path(),
            &config.assets_dir(),
            &config.asset_output_dir(),
        ));
        let assets = AssetPipeline::new(Arc::clone(&cache), config.build.concurrency);

        let mut orchestrator = Self::new(source.clone(), output.clone(), remap.clone())
            .with_asset_cache(cache)
            .with_transform(Arc::new(assets));
        for category in [Category::Markup, Category::Script, Category::Style] {
            orchestrator = orchestrator.with_transform(Arc::new(PassthroughTransform::new(
                category,
                &source,
                &output,
                remap.clone(),
            )));
        }
        orchestrator
    }

    /// Register (or replace) the transform for its category.
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.insert(transform.category(), transform);
        self
    }

    /// Cache reconciled on cycles where the asset category does not run.
    /// Its source root also routes changes to the asset category.
    pub fn with_asset_cache(mut self, cache: Arc<AssetCache>) -> Self {
        self.asset_cache = Some(cache);
        self
    }

    pub async fn build(&self, changed: Option<ChangeSet>) -> BuildReport {
        let start = Instant::now();
        let mut report = BuildReport::default();

        let mirrored = mirror_tree(&self.source_root, &self.output_root, &self.remap).await;
        crate::debug!("build"; "mirrored {} directories", mirrored);

        let changed = changed.map(Arc::new);
        let asset_root = self.asset_cache.as_ref().map(|cache| cache.source_root());
        let scheduled = schedule(changed.as_deref(), asset_root);
        crate::debug!(
            "build";
            "scheduled: {}",
            scheduled.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
        );

        let mut tasks = Vec::with_capacity(scheduled.len());
        for category in scheduled {
            let Some(transform) = self.transforms.get(&category).cloned() else {
                continue;
            };
            let changed = changed.clone();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = transform.run(changed.as_deref()).await;
                (started.elapsed(), result)
            });
            tasks.push((category, handle));
        }

        for (category, handle) in tasks {
            match handle.await {
                Ok((elapsed, result)) => {
                    report.timings.record(category, millis(elapsed));
                    match result {
                        Ok(stats) => {
                            if !stats.is_noop() {
                                crate::debug!("build"; "{}: {}", category, stats);
                            }
                            report.stats.insert(category, stats);
                        }
                        Err(e) => {
                            crate::log!("error"; "{} failed: {:#}", category, e);
                            report.failed.push(category);
                        }
                    }
                }
                Err(e) => {
                    crate::log!("error"; "{} panicked: {}", category, e);
                    report.failed.push(category);
                }
            }
        }

        if report.timings.get(Category::Asset).is_none() {
            self.reconcile_assets().await;
        }

        report.timings.set_total(millis(start.elapsed()));
        report
    }

    /// Evict cache entries whose source vanished, saving when anything changed.
    async fn reconcile_assets(&self) {
        let Some(cache) = self.asset_cache.as_ref().filter(|cache| !cache.is_empty()) else {
            return;
        };
        let removed = cache.reconcile().await;
        if removed == 0 {
            return;
        }
        crate::debug!("assets"; "reconciled {} stale entries", removed);
        if let Err(e) = cache.save().await {
            crate::log!("error"; "failed to save asset cache: {}", e);
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transform::TransformFuture;
    use crate::utils::path::normalize_path;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn changes(paths: &[&str]) -> ChangeSet {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_schedule_full_build() {
        assert_eq!(schedule(None, None), Category::ALL.to_vec());
    }

    #[test]
    fn test_schedule_by_extension() {
        let set = changes(&["/p/src/scss/main.SCSS", "/p/assets/logo.png"]);
        assert_eq!(schedule(Some(&set), None), vec![Category::Style, Category::Asset]);

        let set = changes(&["/p/src/index.html", "/p/src/ts/app.tsx"]);
        assert_eq!(schedule(Some(&set), None), vec![Category::Markup, Category::Script]);
    }

    #[test]
    fn test_schedule_unknown_extension_runs_nothing() {
        let set = changes(&["/p/src/README", "/p/src/notes.md"]);
        assert!(schedule(Some(&set), Some(Path::new("/p/assets"))).is_empty());
    }

    #[test]
    fn test_schedule_extensionless_path_under_asset_root() {
        let root = Path::new("/p/assets");
        let set = changes(&["/p/assets/img"]);
        assert_eq!(schedule(Some(&set), Some(root)), vec![Category::Asset]);
        assert!(schedule(Some(&set), None).is_empty());
    }

    /// Test double: counts invocations, optionally fails or panics.
    struct StubTransform {
        category: Category,
        calls: Arc<AtomicUsize>,
        mode: StubMode,
    }

    #[derive(Clone, Copy)]
    enum StubMode {
        Ok,
        Fail,
        Panic,
    }

    impl StubTransform {
        fn new(category: Category, mode: StubMode) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let stub = Arc::new(Self {
                category,
                calls: Arc::clone(&calls),
                mode,
            });
            (stub, calls)
        }
    }

    impl Transform for StubTransform {
        fn category(&self) -> Category {
            self.category
        }

        fn run<'a>(&'a self, _changed: Option<&'a ChangeSet>) -> TransformFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match self.mode {
                    StubMode::Ok => Ok(TransformStats::default()),
                    StubMode::Fail => anyhow::bail!("compiler exited with 1"),
                    StubMode::Panic => panic!("compiler crashed"),
                }
            })
        }
    }

    fn orchestrator(dir: &Path) -> Orchestrator {
        Orchestrator::new(dir.join("src"), dir.join("dist"), DirRemap::default())
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let dir = TempDir::new().unwrap();
        let (markup, markup_calls) = StubTransform::new(Category::Markup, StubMode::Fail);
        let (style, style_calls) = StubTransform::new(Category::Style, StubMode::Panic);
        let (script, script_calls) = StubTransform::new(Category::Script, StubMode::Ok);
        let orchestrator = orchestrator(dir.path())
            .with_transform(markup)
            .with_transform(style)
            .with_transform(script);

        let report = orchestrator.build(None).await;

        assert_eq!(markup_calls.load(Ordering::SeqCst), 1);
        assert_eq!(style_calls.load(Ordering::SeqCst), 1);
        assert_eq!(script_calls.load(Ordering::SeqCst), 1);
        assert!(!report.is_success());
        assert!(report.failed.contains(&Category::Markup));
        assert!(report.failed.contains(&Category::Style));
        assert!(report.stats.contains_key(&Category::Script));
        assert!(report.timings.total().is_some());
    }

    #[tokio::test]
    async fn test_incremental_runs_only_scheduled() {
        let dir = TempDir::new().unwrap();
        let (markup, markup_calls) = StubTransform::new(Category::Markup, StubMode::Ok);
        let (style, style_calls) = StubTransform::new(Category::Style, StubMode::Ok);
        let orchestrator = orchestrator(dir.path())
            .with_transform(markup)
            .with_transform(style);

        let changed = changes(&["/p/src/scss/site.scss"]);
        let report = orchestrator.build(Some(changed)).await;

        assert!(report.is_success());
        assert_eq!(markup_calls.load(Ordering::SeqCst), 0);
        assert_eq!(style_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.ran(), vec![Category::Style]);
        assert_eq!(report.timings.get(Category::Markup), None);
    }

    #[tokio::test]
    async fn test_full_build_of_project() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/scss")).unwrap();
        fs::create_dir_all(root.join("src/ts")).unwrap();
        fs::create_dir_all(root.join("assets/img")).unwrap();
        fs::write(root.join("src/index.html"), "<h1>home</h1>").unwrap();
        fs::write(root.join("src/scss/main.scss"), "body{}").unwrap();
        fs::write(root.join("src/ts/app.ts"), "export {}").unwrap();
        fs::write(root.join("assets/img/a.png"), b"png").unwrap();

        let config = ProjectConfig::for_root(root);
        let orchestrator = Orchestrator::from_config(&config);

        let report = orchestrator.build(None).await;
        assert!(report.is_success());
        assert!(root.join("dist/index.html").exists());
        assert!(root.join("dist/css/main.scss").exists());
        assert!(root.join("dist/js/app.ts").exists());
        assert!(root.join("dist/assets/img/a.png").exists());
        assert!(root.join(".assetcache.json").exists());

        // Nothing changed: every category is a no-op
        let again = orchestrator.build(None).await;
        assert!(again.stats.values().all(TransformStats::is_noop));
    }

    #[tokio::test]
    async fn test_deleted_asset_directory_propagates() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("assets/img")).unwrap();
        fs::write(root.join("assets/img/a.png"), b"png").unwrap();

        let config = ProjectConfig::for_root(&root);
        let orchestrator = Orchestrator::from_config(&config);
        assert!(orchestrator.build(None).await.is_success());
        assert!(root.join("dist/assets/img/a.png").exists());

        // The watcher reports only the directory itself
        let img_dir = root.join("assets/img");
        fs::remove_dir_all(&img_dir).unwrap();
        let report = orchestrator.build(Some(ChangeSet::from_iter([img_dir]))).await;

        assert_eq!(report.ran(), vec![Category::Asset]);
        assert!(!root.join("dist/assets/img/a.png").exists());
        let cache = fs::read_to_string(root.join(".assetcache.json")).unwrap();
        assert!(!cache.contains("img/a.png"));
    }

    #[tokio::test]
    async fn test_markup_only_cycle_reconciles_assets() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("src/index.html"), "<h1>home</h1>").unwrap();
        fs::write(root.join("assets/logo.svg"), "<svg/>").unwrap();

        let config = ProjectConfig::for_root(&root);
        let orchestrator = Orchestrator::from_config(&config);
        orchestrator.build(None).await;
        assert!(root.join("dist/assets/logo.svg").exists());

        // Only the page edit arrives; the asset removal was never reported
        fs::remove_file(root.join("assets/logo.svg")).unwrap();
        let page = root.join("src/index.html");
        let report = orchestrator.build(Some(ChangeSet::from_iter([page]))).await;

        assert_eq!(report.ran(), vec![Category::Markup]);
        assert!(!root.join("dist/assets/logo.svg").exists());
        let cache = fs::read_to_string(root.join(".assetcache.json")).unwrap();
        assert!(!cache.contains("logo.svg"));
    }
}
