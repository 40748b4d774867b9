use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

/// Configured roots and which of them the watcher currently covers.
///
/// A root that is created after startup, or deleted and recreated, produces
/// no events of its own since nothing watches its parent. [`Self::maintain`]
/// finds those transitions so the caller can rebuild everything.
pub(super) struct WatchRoots {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            desired: paths,
            attached: FxHashSet::default(),
        }
    }

    pub(super) fn attach_existing(&mut self, watcher: &mut RecommendedWatcher) -> notify::Result<()> {
        for path in &self.desired {
            if !path.exists() {
                crate::debug!("watch"; "{} does not exist yet", path.display());
                continue;
            }
            watcher.watch(path, RecursiveMode::Recursive)?;
            self.attached.insert(path.clone());
        }
        Ok(())
    }

    /// Sync with the filesystem. Returns roots that vanished or (re)appeared.
    pub(super) fn maintain(&mut self, watcher: &mut RecommendedWatcher) -> Vec<PathBuf> {
        let mut changed = Vec::new();

        self.attached.retain(|path| {
            let exists = path.exists();
            if !exists {
                crate::log!("watch"; "{} was removed", path.display());
                changed.push(path.clone());
            }
            exists
        });

        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    crate::log!("watch"; "now watching {}", path.display());
                    self.attached.insert(path.clone());
                    changed.push(path.clone());
                }
                Err(e) => crate::debug!("watch"; "cannot watch {}: {}", path.display(), e),
            }
        }

        changed
    }

    pub(super) fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn watcher() -> RecommendedWatcher {
        notify::recommended_watcher(|_: notify::Result<notify::Event>| {}).unwrap()
    }

    #[test]
    fn test_attach_skips_missing_roots() {
        let dir = TempDir::new().unwrap();
        let mut watcher = watcher();
        let mut roots = WatchRoots::new(vec![dir.path().to_path_buf(), dir.path().join("missing")]);

        roots.attach_existing(&mut watcher).unwrap();
        assert_eq!(roots.attached_count(), 1);
        assert!(roots.maintain(&mut watcher).is_empty());
    }

    #[test]
    fn test_maintain_reports_root_transitions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("assets");
        let mut watcher = watcher();
        let mut roots = WatchRoots::new(vec![root.clone()]);
        roots.attach_existing(&mut watcher).unwrap();

        fs::create_dir(&root).unwrap();
        assert_eq!(roots.maintain(&mut watcher), vec![root.clone()]);
        assert_eq!(roots.attached_count(), 1);
        // Steady state reports nothing
        assert!(roots.maintain(&mut watcher).is_empty());

        fs::remove_dir(&root).unwrap();
        assert_eq!(roots.maintain(&mut watcher), vec![root.clone()]);
        assert_eq!(roots.attached_count(), 0);
    }
}
