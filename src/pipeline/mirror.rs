//! Source-to-output directory mirroring.
//!
//! The output tree gets one directory per source directory, with some names
//! translated (`scss` -> `css`, `ts` -> `js`) so compiled artifacts land
//! where pages expect them.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Directory-name translation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRemap {
    names: BTreeMap<String, String>,
}

impl Default for DirRemap {
    fn default() -> Self {
        Self::new(default_remap())
    }
}

/// `scss -> css`, `ts -> js`
pub fn default_remap() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("scss".to_string(), "css".to_string()),
        ("ts".to_string(), "js".to_string()),
    ])
}

impl DirRemap {
    pub fn new(names: BTreeMap<String, String>) -> Self {
        Self { names }
    }

    /// Output name for a source directory name. Applies at any depth.
    pub fn dir_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.names.get(name).map_or(name, String::as_str)
    }

    /// Output path for a file under `source_root`.
    ///
    /// Directory components are remapped, the file name is kept.
    /// `None` when `path` is outside `source_root`.
    pub fn output_path(&self, source_root: &Path, output_root: &Path, path: &Path) -> Option<PathBuf> {
        let rel = path.strip_prefix(source_root).ok()?;
        let components: Vec<_> = rel.components().collect();
        let (file, dirs) = components.split_last()?;

        let mut out = output_root.to_path_buf();
        for component in dirs {
            match component {
                Component::Normal(name) => match name.to_str() {
                    Some(name) => out.push(self.dir_name(name)),
                    None => out.push(name),
                },
                Component::CurDir => {}
                _ => return None,
            }
        }
        match file {
            Component::Normal(name) => out.push(name),
            _ => return None,
        }
        Some(out)
    }
}

/// Recreate the directory structure of `source` under `target`.
///
/// Walks with an explicit stack. A directory that cannot be read or created
/// is logged and skipped, its siblings are still mirrored. Returns the number
/// of directories ensured.
pub async fn mirror_tree(source: &Path, target: &Path, remap: &DirRemap) -> usize {
    let mut stack = vec![(source.to_path_buf(), target.to_path_buf())];
    let mut ensured = 0;

    while let Some((src, dst)) = stack.pop() {
        if let Err(e) = tokio::fs::create_dir_all(&dst).await {
            crate::log!("build"; "cannot create {}: {}", dst.display(), e);
            continue;
        }
        ensured += 1;

        let mut entries = match tokio::fs::read_dir(&src).await {
            Ok(entries) => entries,
            Err(e) => {
                crate::log!("build"; "cannot read {}: {}", src.display(), e);
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    crate::log!("build"; "error while reading {}: {}", src.display(), e);
                    break;
                }
            };
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if !is_dir {
                continue;
            }

            let name = entry.file_name();
            let out_name = match name.to_str() {
                Some(name) => remap.dir_name(name).to_string(),
                None => name.to_string_lossy().into_owned(),
            };
            stack.push((entry.path(), dst.join(out_name)));
        }
    }

    ensured
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_dir_name() {
        let remap = DirRemap::default();
        assert_eq!(remap.dir_name("scss"), "css");
        assert_eq!(remap.dir_name("ts"), "js");
        assert_eq!(remap.dir_name("img"), "img");
        assert_eq!(remap.dir_name("SCSS"), "SCSS");
    }

    #[test]
    fn test_output_path_remaps_directories_only() {
        let remap = DirRemap::default();
        let src = Path::new("/p/src");
        let out = Path::new("/p/dist");

        assert_eq!(
            remap.output_path(src, out, Path::new("/p/src/scss/main.scss")),
            Some(PathBuf::from("/p/dist/css/main.scss"))
        );
        assert_eq!(
            remap.output_path(src, out, Path::new("/p/src/pages/ts/ts")),
            Some(PathBuf::from("/p/dist/pages/js/ts"))
        );
        assert_eq!(
            remap.output_path(src, out, Path::new("/p/src/index.html")),
            Some(PathBuf::from("/p/dist/index.html"))
        );
        assert_eq!(remap.output_path(src, out, Path::new("/p/assets/a.png")), None);
    }

    #[tokio::test]
    async fn test_mirror_tree() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("dist");
        fs::create_dir_all(src.join("scss/partials")).unwrap();
        fs::create_dir_all(src.join("ts")).unwrap();
        fs::create_dir_all(src.join("blog/ts")).unwrap();
        fs::write(src.join("index.html"), "<p></p>").unwrap();

        let ensured = mirror_tree(&src, &out, &DirRemap::default()).await;

        assert_eq!(ensured, 6);
        assert!(out.join("css/partials").is_dir());
        assert!(out.join("js").is_dir());
        assert!(out.join("blog/js").is_dir());
        assert!(!out.join("scss").exists());
        // Files are not copied by mirroring
        assert!(!out.join("index.html").exists());
    }

    #[tokio::test]
    async fn test_mirror_missing_source_still_creates_target() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("dist");
        let ensured = mirror_tree(&dir.path().join("nope"), &out, &DirRemap::default()).await;
        assert_eq!(ensured, 1);
        assert!(out.is_dir());
    }
}
