//! Configuration sections of `hotbuild.toml`.

mod build;
mod serve;
mod watch;

pub use build::BuildConfig;
pub use serve::ServeConfig;
pub use watch::WatchConfig;
