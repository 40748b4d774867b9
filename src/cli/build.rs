//! One-shot `build` and `clean` commands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::config::ProjectConfig;
use crate::log;
use crate::pipeline::{BuildReport, Orchestrator};

/// Runtime for the build pipeline and the actors.
///
/// Everything is multiplexed on one thread; blocking file work goes through
/// `spawn_blocking`.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Full build into the configured output directory.
pub fn run_build(config: &ProjectConfig) -> Result<()> {
    let report = runtime()?.block_on(async { Orchestrator::from_config(config).build(None).await });
    log_report(&report);

    if !report.is_success() {
        bail!("{} categories failed", report.failed.len());
    }
    log_build_result(&config.output_dir());
    Ok(())
}

/// Timing summary line; per-category errors were logged as they happened.
pub fn log_report(report: &BuildReport) {
    log!("build"; "{}", report.timings.colored_summary());
}

fn log_build_result(output: &Path) {
    let file_count = fs::read_dir(output)
        .map(|entries| entries.filter_map(|entry| entry.ok()).count())
        .unwrap_or(0);

    if file_count == 0 {
        log!("warn"; "output is empty, check the source directory");
    } else {
        log!("build"; "done");
    }
}

/// Empty every output directory and delete the asset cache file.
pub fn run_clean(config: &ProjectConfig) -> Result<()> {
    for dir in config.output_dirs() {
        clean_dir(&dir)?;
    }

    let cache = config.cache_path();
    match fs::remove_file(&cache) {
        Ok(()) => log!("clean"; "removed {}", cache.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", cache.display())),
    }

    Ok(())
}

/// Remove the contents of `dir`, keeping the directory itself.
fn clean_dir(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.with_context(|| format!("Failed to remove {}", path.display()))?;
        removed += 1;
    }

    log!("clean"; "emptied {} ({} entries)", dir.display(), removed);
    Ok(())
}
