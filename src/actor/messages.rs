//! Actor Message Definitions
//!
//! ```text
//! FsActor --Rebuild/FullRebuild--> BuildActor --Reload--> WsActor
//! HTTP thread --Register--> WsActor
//! ```

use crate::pipeline::ChangeSet;

use super::ws::ClientSocket;

/// Messages to the BuildActor
#[derive(Debug)]
pub enum BuildMsg {
    /// Rebuild the categories touched by these paths
    Rebuild(ChangeSet),
    /// Rebuild everything (a watch root appeared or vanished)
    FullRebuild,
    Shutdown,
}

/// Messages to the WsActor
pub enum WsMsg {
    /// Upgraded client, ready to receive
    Register(ClientSocket),
    /// Tell every client to reload (after the configured delay)
    Reload,
    /// Close every client and stop
    Shutdown,
}
