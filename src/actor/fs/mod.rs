//! FileSystem Actor
//!
//! Watches the source roots and hands debounced change sets to the BuildActor.
//! Implements the "Watcher-First" pattern: the watcher is live before the
//! initial build, so nothing edited during that build is lost.
//!
//! ```text
//! notify → ChangeAggregator (pending set) → Debouncer (quiet period) → Rebuild
//! root check (interval) → root appeared / vanished                   → FullRebuild
//! ```

use std::path::PathBuf;
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::BuildMsg;

/// How often missing or deleted roots are looked for.
const ROOT_CHECK: Duration = Duration::from_secs(2);

// Pending change set.
mod aggregator;
// Pure trailing-edge timing.
mod debouncer;
// Shared fs event types.
mod types;
// Watch root attach/re-attach lifecycle.
mod watch_roots;


use aggregator::ChangeAggregator;
use debouncer::{Clock, Debouncer};
use watch_roots::WatchRoots;

use crate::pipeline::ChangeSet;

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    watch_roots: WatchRoots,
    build_tx: mpsc::Sender<BuildMsg>,
    aggregator: ChangeAggregator,
    debouncer: Debouncer<ChangeSet>,
}

impl FsActor {
    /// Start watching immediately; events buffer until [`FsActor::run`].
    pub fn new(
        paths: Vec<PathBuf>,
        build_tx: mpsc::Sender<BuildMsg>,
        quiet: Duration,
    ) -> notify::Result<Self> {
        // notify has no async API
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut watch_roots = WatchRoots::new(paths);
        watch_roots.attach_existing(&mut watcher)?;
        crate::debug!("watch"; "attached {} roots", watch_roots.attached_count());

        Ok(Self {
            notify_rx,
            watcher,
            watch_roots,
            build_tx,
            aggregator: ChangeAggregator::new(),
            debouncer: Debouncer::new(quiet),
        })
    }

    /// Run the actor event loop until the BuildActor goes away.
    pub async fn run(self) {
        let Self {
            notify_rx,
            mut watcher,
            mut watch_roots,
            build_tx,
            mut aggregator,
            mut debouncer,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        let mut root_check = tokio::time::interval(ROOT_CHECK);
        root_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => {
                    if aggregator.add_event(&event) {
                        debouncer.trigger(aggregator.snapshot());
                    }
                }
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if dispatch(&mut aggregator, &mut debouncer, &build_tx).await.is_err() {
                        break;
                    }
                }
                _ = root_check.tick() => {
                    // Files under a root that came or went produced no events
                    if !watch_roots.maintain(&mut watcher).is_empty()
                        && build_tx.send(BuildMsg::FullRebuild).await.is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}

/// Send the debounced change set, then start a fresh cycle.
///
/// Returns `Err(())` if the BuildActor shut down.
async fn dispatch<C: Clock>(
    aggregator: &mut ChangeAggregator,
    debouncer: &mut Debouncer<ChangeSet, C>,
    build_tx: &mpsc::Sender<BuildMsg>,
) -> Result<(), ()> {
    let Some(changed) = debouncer.take_if_ready() else {
        return Ok(());
    };

    crate::log!("watch"; "{}", aggregator.summary());
    aggregator.clear();

    if changed.is_empty() {
        return Ok(());
    }
    build_tx.send(BuildMsg::Rebuild(changed)).await.map_err(|_| ())
}
