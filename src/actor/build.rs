//! Build Actor
//!
//! Runs builds one at a time. Triggers that arrive while a build is running
//! wait in the channel and are merged into a single follow-up build.

use tokio::sync::mpsc;

use super::messages::{BuildMsg, WsMsg};
use crate::logger::{status_error, status_success};
use crate::pipeline::{BuildReport, ChangeSet, Orchestrator};

/// What the next build has to cover.
#[derive(Debug, PartialEq, Eq)]
enum BuildRequest {
    Full,
    Changes(ChangeSet),
}

impl BuildRequest {
    /// A full build absorbs everything; change sets are unioned.
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Changes(mut a), Self::Changes(b)) => {
                a.extend(b);
                Self::Changes(a)
            }
            _ => Self::Full,
        }
    }

    fn into_changes(self) -> Option<ChangeSet> {
        match self {
            Self::Full => None,
            Self::Changes(changed) => Some(changed),
        }
    }
}

pub struct BuildActor {
    rx: mpsc::Receiver<BuildMsg>,
    ws_tx: mpsc::Sender<WsMsg>,
    orchestrator: Orchestrator,
}

impl BuildActor {
    pub fn new(
        rx: mpsc::Receiver<BuildMsg>,
        ws_tx: mpsc::Sender<WsMsg>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            rx,
            ws_tx,
            orchestrator,
        }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            let mut request = match msg {
                BuildMsg::Rebuild(changed) => BuildRequest::Changes(changed),
                BuildMsg::FullRebuild => BuildRequest::Full,
                BuildMsg::Shutdown => break,
            };

            // Coalesce everything queued while the previous build ran
            let mut shutdown = false;
            while let Ok(next) = self.rx.try_recv() {
                request = match next {
                    BuildMsg::Rebuild(changed) => request.merge(BuildRequest::Changes(changed)),
                    BuildMsg::FullRebuild => BuildRequest::Full,
                    BuildMsg::Shutdown => {
                        shutdown = true;
                        break;
                    }
                };
            }

            if !self.build(request).await || shutdown {
                break;
            }
        }
        crate::debug!("build"; "actor stopped");
    }

    /// Returns `false` once the WsActor is gone.
    async fn build(&self, request: BuildRequest) -> bool {
        let report = self.orchestrator.build(request.into_changes()).await;

        if report.ran().is_empty() {
            crate::debug!("build"; "nothing to rebuild");
            return true;
        }

        if !report.is_success() {
            status_error(&failure_summary(&report), &report.timings.colored_summary());
            return true;
        }

        status_success(&format!("rebuilt {}", report.timings.colored_summary()));
        self.ws_tx.send(WsMsg::Reload).await.is_ok()
    }
}

fn failure_summary(report: &BuildReport) -> String {
    let names: Vec<_> = report.failed.iter().map(|c| c.name()).collect();
    format!("build failed: {}", names.join(", "))
}
