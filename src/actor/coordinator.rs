//! Actor Coordinator - wires up the live reload actor system
//!
//! The Coordinator is a thin orchestrator: it creates channels, starts the
//! actors and the HTTP server, and tears everything down on Ctrl+C. Build
//! logic lives in `pipeline/`.
//!
//! ```text
//! startup:  watcher → initial full build → HTTP server → actors
//!
//! FsActor --Rebuild--> BuildActor --Reload--> WsActor <--Register-- HTTP
//! ```
//!
//! The watcher starts first so edits made during the initial build are
//! picked up by the first debounce cycle instead of being lost.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::build::BuildActor;
use super::fs::FsActor;
use super::messages::{BuildMsg, WsMsg};
use super::ws::WsActor;
use crate::cli::build::log_report;
use crate::cli::serve::{DevServer, ServeContext};
use crate::config::ProjectConfig;
use crate::pipeline::Orchestrator;

const CHANNEL_BUFFER: usize = 32;

/// How long to wait for sockets to close on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Coordinator {
    config: Arc<ProjectConfig>,
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn with_config(config: ProjectConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown_rx: None,
        }
    }

    /// Set shutdown signal receiver.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run until the shutdown signal fires (or an actor stops).
    pub async fn run(mut self) -> Result<()> {
        let config = Arc::clone(&self.config);
        let (build_tx, build_rx) = mpsc::channel::<BuildMsg>(CHANNEL_BUFFER);
        let (ws_tx, ws_rx) = mpsc::channel::<WsMsg>(CHANNEL_BUFFER);

        let watch_paths = config.watch_roots().into_iter().map(|(_, path)| path).collect();
        let fs_actor = FsActor::new(watch_paths, build_tx.clone(), config.watch.debounce())
            .map_err(|e| anyhow!("watcher failed: {}", e))?;

        let orchestrator = Orchestrator::from_config(&config);
        let report = orchestrator.build(None).await;
        log_report(&report);
        if !report.is_success() {
            crate::log!("build"; "initial build had errors; serving the last good output");
        }

        let mut server = DevServer::new(
            config.serve.interface,
            config.serve.port,
            ServeContext {
                output_root: config.output_dir(),
                ws_tx: ws_tx.clone(),
            },
        );
        server.start()?;
        crate::log!("watch"; "watching {}", describe_roots(&config));

        let build_actor = BuildActor::new(build_rx, ws_tx.clone(), orchestrator);
        let ws_actor = WsActor::new(ws_rx, config.serve.reload_delay(), config.serve.heartbeat());

        let fs_handle = tokio::spawn(fs_actor.run());
        let mut build_handle = tokio::spawn(build_actor.run());
        let mut ws_handle = tokio::spawn(ws_actor.run());

        crate::debug!("actor"; "start");
        match self.shutdown_rx.take() {
            Some(rx) => loop {
                if rx.try_recv().is_ok() {
                    crate::debug!("actor"; "shutdown signal received");
                    break;
                }
                // Stop early if an actor died on its own
                if build_handle.is_finished() || ws_handle.is_finished() {
                    break;
                }
                if let Err(e) = server.recover() {
                    crate::log!("error"; "cannot restart server: {:#}", e);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            },
            None => {
                tokio::select! {
                    _ = &mut build_handle => {}
                    _ = &mut ws_handle => {}
                }
            }
        }

        // Close the watcher first so no new builds are queued
        fs_handle.abort();
        let _ = build_tx.send(BuildMsg::Shutdown).await;
        let _ = ws_tx.send(WsMsg::Shutdown).await;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, ws_handle).await;

        server.stop();
        // An in-flight build is not cancelled, only waited on briefly
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, build_handle).await;

        crate::debug!("actor"; "stopped");
        Ok(())
    }
}

fn describe_roots(config: &ProjectConfig) -> String {
    config
        .watch_roots()
        .into_iter()
        .map(|(_, path)| {
            path.strip_prefix(&config.root)
                .unwrap_or(&path)
                .display()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(", ")
}
