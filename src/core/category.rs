//! File category definitions.
//!
//! A single extension table drives both change routing (which transform
//! categories a change set schedules) and asset-type detection.

use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif", "tiff", "svg", "gif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv"];
pub const GENERIC_ASSET_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "ico", "json", "txt"];

/// Transform category, one per external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// `.html`, `.htm`
    Markup,
    /// `.ts`, `.tsx`, `.js`
    Script,
    /// `.scss`, `.sass`, `.css`
    Style,
    /// Images, videos, fonts and other static files
    Asset,
}

impl Category {
    pub const ALL: [Self; 4] = [Self::Markup, Self::Script, Self::Style, Self::Asset];

    pub fn name(self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Script => "script",
            Self::Style => "style",
            Self::Asset => "asset",
        }
    }

    /// Does `ext` (without dot, any case) belong to this category?
    pub fn has_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        let ext = ext.as_str();
        match self {
            Self::Markup => matches!(ext, "html" | "htm"),
            Self::Script => matches!(ext, "ts" | "tsx" | "js"),
            Self::Style => matches!(ext, "scss" | "sass" | "css"),
            Self::Asset => AssetKind::from_extension(ext).is_some(),
        }
    }

    /// Check whether a path's extension belongs to this category.
    pub fn matches(self, path: &Path) -> bool {
        extension(path).is_some_and(|ext| self.has_extension(ext))
    }

    /// Detect the category of a path. `None` for unknown extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.matches(path))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of asset file, decides how the asset processor treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
    /// Fonts, icons, data files: copied verbatim
    Generic,
}

impl AssetKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else if GENERIC_ASSET_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Generic)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        extension(path).and_then(Self::from_extension)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}
