//! Scheduled work and its bookkeeping.

use super::TimerState;
use reflex_types::{OwnerId, TaskId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// A unit of scheduled work.
///
/// Runs on a scheduler worker thread. Work that must touch primary-only
/// state should go through
/// [`PrimaryThread::run_on_primary`](crate::host::PrimaryThread::run_on_primary).
pub trait Task: Send + Sync + 'static {
    /// Runs one execution.
    ///
    /// # Errors
    ///
    /// Errors are reported; a repeating task keeps its schedule.
    fn run(&self) -> anyhow::Result<()>;
}

impl<F> Task for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn run(&self) -> anyhow::Result<()> {
        self()
    }
}

/// A queued task as seen by the scheduler maps.
pub(super) struct TaskEntry {
    pub(super) owner: OwnerId,
    pub(super) cancelled: Arc<AtomicBool>,
    pub(super) abort: AbortHandle,
}

impl TaskEntry {
    /// Prevents future firings. An execution already running finishes.
    pub(super) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.abort.abort();
    }
}

/// Marks a task as running for as long as its body is alive.
pub(super) struct RunningGuard {
    state: Arc<TimerState>,
    id: TaskId,
}

impl RunningGuard {
    pub(super) fn enter(state: Arc<TimerState>, id: TaskId) -> Self {
        state.running.lock().insert(id);
        Self { state, id }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.state.running.lock().remove(&self.id);
    }
}
