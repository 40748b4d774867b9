//! Actor System for live reload
//!
//! Message-passing concurrency for `serve`:
//!
//! ```text
//! FsActor --> BuildActor --> WsActor
//! (watch)     (pipeline)    (broadcast)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with change aggregation and debouncing
//! - `build` - Single-flight build runner
//! - `ws` - WebSocket registry and broadcast
//! - `coordinator` - Wires up and runs actors

pub mod build;
pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod ws;

pub use coordinator::Coordinator;
