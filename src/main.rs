//! hotbuild - incremental build and live-reload dev server.

mod actor;
mod cache;
mod cli;
mod config;
mod core;
mod freshness;
mod logger;
mod pipeline;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::ProjectConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = ProjectConfig::load(&cli)?;

    match &cli.command {
        Commands::Serve { .. } => cli::serve::run_serve(config),
        Commands::Build { .. } => cli::build::run_build(&config),
        Commands::Clean => cli::build::run_clean(&config),
    }
}
