//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! source = "src"                  # mirrored into the output tree
//! assets = "assets"               # raw assets, cached by content hash
//! utils = "utils"                 # shared code, watched only
//! output = "dist"                 # development output
//! prod_output = "prod"            # output of `hotbuild build --prod`
//! cache_file = ".assetcache.json"
//! concurrency = 10                # parallel asset jobs
//!
//! [build.remap]                   # source dir name -> output dir name
//! scss = "css"
//! ts = "js"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::CACHE_FILE;
use crate::pipeline::mirror::default_remap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub source: PathBuf,
    pub assets: PathBuf,
    pub utils: PathBuf,
    pub output: PathBuf,
    pub prod_output: PathBuf,
    pub cache_file: PathBuf,
    pub concurrency: usize,
    pub remap: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source: "src".into(),
            assets: "assets".into(),
            utils: "utils".into(),
            output: "dist".into(),
            prod_output: "prod".into(),
            cache_file: CACHE_FILE.into(),
            concurrency: 10,
            remap: default_remap(),
        }
    }
}
