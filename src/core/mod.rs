//! Core types shared across the codebase.

mod category;
mod state;

pub use category::{AssetKind, Category};
pub use state::{is_shutdown, register_shutdown, setup_shutdown_handler};
