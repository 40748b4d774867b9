//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Incremental build and live-reload dev server
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: hotbuild.toml)
    #[arg(short = 'C', long, global = true, default_value = "hotbuild.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build, serve the output with live reload, and rebuild on change
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// First port to try; the next free one is used if taken
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one full build and exit
    #[command(visible_alias = "b")]
    Build {
        /// Write into the production output directory
        #[arg(long)]
        prod: bool,
    },

    /// Empty the output directories and delete the asset cache
    Clean,
}
