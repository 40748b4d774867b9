//! Project configuration from `hotbuild.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [build] [serve] [watch]
//! ├── error          # ConfigError
//! └── mod.rs         # ProjectConfig (this file)
//! ```
//!
//! The file is optional: every field has a default, and a missing file means
//! "all defaults, rooted at the current directory". Relative paths resolve
//! against the directory holding the config file.

mod error;
pub mod section;

pub use error::ConfigError;
pub use section::{BuildConfig, ServeConfig, WatchConfig};

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};
use crate::log;
use crate::utils::path::normalize_path;

/// Root configuration structure representing hotbuild.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

impl ProjectConfig {
    /// Load configuration for a CLI invocation and apply its overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        let config_path = if cli.config.is_absolute() {
            cli.config.clone()
        } else {
            cwd.join(&cli.config)
        };

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            crate::debug!("config"; "{} not found, using defaults", config_path.display());
            Self::default()
        };

        let root = config_path
            .parent()
            .map_or_else(|| cwd.clone(), Path::to_path_buf);
        config.config_path = config_path;
        config.root = normalize_path(&root);
        config.apply_command_options(cli);
        config.validate()?;

        Ok(config)
    }

    /// Default configuration rooted at `root`.
    #[cfg(test)]
    pub fn for_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            config_path: root.join("hotbuild.toml"),
            ..Self::default()
        }
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::from)?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {} are ignored: {}", display_path, fields.join(", "));
    }

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Serve { interface, port } => {
                if let Some(interface) = interface {
                    self.serve.interface = *interface;
                }
                if let Some(port) = port {
                    self.serve.port = *port;
                }
            }
            Commands::Build { prod: true } => {
                self.build.output = self.build.prod_output.clone();
            }
            Commands::Build { prod: false } | Commands::Clean => {}
        }
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.concurrency == 0 {
            return Err(ConfigError::Validation(
                "build.concurrency must be at least 1".into(),
            ));
        }

        for (from, to) in &self.build.remap {
            if !is_single_component(from) || !is_single_component(to) {
                return Err(ConfigError::Validation(format!(
                    "build.remap entry `{from} = {to}` must map one directory name to another"
                )));
            }
        }

        // Writing into a watched tree would retrigger builds forever
        let output = self.output_dir();
        for (name, root) in self.watch_roots() {
            if output.starts_with(&root) || root.starts_with(&output) {
                return Err(ConfigError::Validation(format!(
                    "build.output `{}` overlaps watched build.{} `{}`",
                    self.build.output.display(),
                    name,
                    root.display()
                )));
            }
        }

        Ok(())
    }

    /// Join a path with the root directory.
    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root_join(&self.build.source)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root_join(&self.build.assets)
    }

    pub fn utils_dir(&self) -> PathBuf {
        self.root_join(&self.build.utils)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root_join(&self.build.output)
    }

    /// Processed assets live under `<output>/<assets dir name>`.
    pub fn asset_output_dir(&self) -> PathBuf {
        let name = self
            .build
            .assets
            .file_name()
            .map_or_else(|| PathBuf::from("assets"), PathBuf::from);
        self.output_dir().join(name)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root_join(&self.build.cache_file)
    }

    /// Output trees `clean` empties: development and production.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.output_dir(), self.root_join(&self.build.prod_output)];
        dirs.dedup();
        dirs
    }

    /// Trees the watcher observes, with their config key.
    pub fn watch_roots(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("source", self.source_dir()),
            ("utils", self.utils_dir()),
            ("assets", self.assets_dir()),
        ]
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Parse a TOML snippet rooted at a fixed directory (tests only).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> ProjectConfig {
    let (mut config, _) = ProjectConfig::parse_with_ignored(content).unwrap();
    config.root = PathBuf::from("/project");
    config
}
