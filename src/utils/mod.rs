//! Shared helpers with no knowledge of the build pipeline.

pub mod mime;
pub mod path;
pub mod port;
