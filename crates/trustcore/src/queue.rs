//! Serialized execution of verification tasks.
//!
//! Verification reads the user store, folds pending entries and writes the
//! result back. Two such tasks interleaving at an await point would read
//! stale state, so every task runs through a [`TaskQueue`] of width one.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// FIFO queue running one task at a time.
///
/// Tasks start in enqueue order, each after the previous one completed. A
/// failing task does not affect the next ones. A caller that stops waiting
/// before its turn is skipped.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    active: bool,
    waiting: VecDeque<oneshot::Sender<()>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once every task enqueued before it has completed.
    pub async fn enqueue<F: Future>(&self, task: F) -> F::Output {
        let _slot = self.acquire().await;
        task.await
    }

    /// Number of callers waiting for their turn.
    pub fn waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self) -> Slot<'_> {
        let rx = {
            let mut state = self.lock();
            if !state.active {
                state.active = true;
                return Slot { queue: self };
            }
            let (tx, rx) = oneshot::channel();
            state.waiting.push_back(tx);
            rx
        };

        let mut pending = PendingSlot {
            queue: self,
            rx: Some(rx),
        };
        if let Some(rx) = pending.rx.as_mut() {
            // The sender is only dropped after a send, or with the queue.
            let _ = rx.await;
        }
        pending.rx = None;
        Slot { queue: self }
    }

    /// Hand the turn to the first caller still waiting, or go idle.
    fn release(&self) {
        let mut state = self.lock();
        while let Some(tx) = state.waiting.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        state.active = false;
    }
}

/// The turn of the running task. Passed on when dropped.
struct Slot<'a> {
    queue: &'a TaskQueue,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.queue.release();
    }
}

/// A caller waiting for its turn.
///
/// If the caller goes away after the turn was handed to it, the turn is
/// passed on instead of being lost.
struct PendingSlot<'a> {
    queue: &'a TaskQueue,
    rx: Option<oneshot::Receiver<()>>,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                self.queue.release();
            }
        }
    }
}
