use std::path::Path;

use rustc_hash::FxHashMap;

use super::types::ChangeKind;
use crate::core::Category;
use crate::pipeline::ChangeSet;
use crate::utils::path::normalize_path;

/// Paths changed since the last build was handed off.
///
/// Deduplicates by absolute path; the latest event kind wins and is only
/// kept for logging.
#[derive(Debug, Default)]
pub struct ChangeAggregator {
    changes: FxHashMap<std::path::PathBuf, ChangeKind>,
}

impl ChangeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notify event. Returns whether any path was accepted.
    pub fn add_event(&mut self, event: &notify::Event) -> bool {
        let Some(kind) = ChangeKind::from_event(&event.kind) else {
            return false;
        };

        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);

        let mut accepted = false;
        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            let path = normalize_path(path);
            crate::debug!(
                "watch";
                "event {}: {} ({})",
                kind.label(),
                path.display(),
                Category::from_path(&path).map_or("other", Category::name)
            );
            self.changes.insert(path, kind);
            accepted = true;
        }
        accepted
    }

    /// Owned copy of the pending paths.
    pub fn snapshot(&self) -> ChangeSet {
        self.changes.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// `2 modified, 1 removed`
    pub fn summary(&self) -> String {
        [ChangeKind::Created, ChangeKind::Modified, ChangeKind::Removed]
            .into_iter()
            .filter_map(|kind| {
                let n = self.changes.values().filter(|k| **k == kind).count();
                (n > 0).then(|| format!("{} {}", n, kind.label()))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Editor and OS artifacts. Other dotfiles (`.htaccess`, `.well-known/`) are real sources.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        // emacs lock and autosave files
        || name.starts_with(".#")
        || (name.len() > 1 && name.starts_with('#') && name.ends_with('#'))
        // vim tests directory writability with this name
        || name == "4913"
        || name == ".DS_Store"
}
