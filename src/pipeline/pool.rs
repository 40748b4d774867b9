//! Bounded-concurrency task pool.
//!
//! At most `limit` submitted futures run at once; the rest wait in a FIFO
//! queue. A finishing task (success, error or panic) hands its slot to the
//! next queued one.
//!
//! ```text
//! submit() ──► running < limit ? ──yes──► spawn
//!                    │
//!                    no ──► queue.push_back
//!
//! task done ──► SlotGuard::drop ──► queue.pop_front ? spawn : running -= 1
//! ```
//!
//! Must be used from inside a tokio runtime.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("pooled task aborted before completing")]
    Aborted,
}

/// Cloneable handle to a shared pool.
#[derive(Clone)]
pub struct ConcurrencyPool {
    shared: Arc<Shared>,
}

struct Shared {
    limit: usize,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    running: usize,
    queue: VecDeque<Job>,
}

impl ConcurrencyPool {
    /// Create a pool running at most `limit` tasks (0 is treated as 1).
    pub fn new(limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                limit: limit.max(1),
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// Tasks currently holding a slot.
    pub fn running(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Submit a future. It starts now if a slot is free, otherwise after every
    /// previously queued task has started.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = tx.send(task.await);
        });

        let start_now = {
            let mut state = self.shared.state.lock();
            if state.running < self.shared.limit {
                state.running += 1;
                Some(job)
            } else {
                state.queue.push_back(job);
                None
            }
        };

        if let Some(job) = start_now {
            spawn_job(Arc::clone(&self.shared), job);
        }

        TaskHandle { rx }
    }
}

/// Run `job` holding one slot. The slot is released when the task ends,
/// including by panic.
fn spawn_job(shared: Arc<Shared>, job: Job) {
    tokio::spawn(async move {
        let _slot = SlotGuard(shared);
        job.await;
    });
}

struct SlotGuard(Arc<Shared>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // Slot moves straight to the next job, `running` stays unchanged
        let next = {
            let mut state = self.0.state.lock();
            let next = state.queue.pop_front();
            if next.is_none() {
                state.running -= 1;
            }
            next
        };

        if let Some(job) = next {
            spawn_job(Arc::clone(&self.0), job);
        }
    }
}

/// Completion of one submitted task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| PoolError::Aborted))
    }
}
