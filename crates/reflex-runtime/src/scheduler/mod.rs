//! Tick-based task scheduler.
//!
//! # Architecture
//!
//! ```text
//! caller thread                timer thread ("reflex-scheduler")
//! ─────────────                ─────────────────────────────────
//! schedule_*(..) ── spawn ───► driver future per task
//!      │                         sleep / interval (ticks → ms)
//!      │                         readiness gate (poll until ready)
//!      ▼                         spawn_blocking(body) ──► worker thread
//! tasks: TaskId → TaskEntry                                 │
//! running: {TaskId}  ◄──────────── RunningGuard ────────────┘
//! ```
//!
//! The timer thread owns a current-thread tokio runtime and only awaits;
//! bodies run on the runtime's blocking pool so a slow body never delays
//! other timers. A repeating task's executions never overlap.
//!
//! # Cancellation
//!
//! Cancelling stops future firings only. A body that has started runs to
//! completion and stays visible through
//! [`is_currently_running`](Scheduler::is_currently_running) until then.

mod task;

pub use task::Task;

use crate::config::RuntimeConfig;
use crate::error::{guarded, FaultContext, FaultOrigin, RuntimeError};
use crate::host::{FaultReporter, Host, ReadinessProbe};
use parking_lot::Mutex;
use reflex_types::{OwnerId, TaskId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use task::{RunningGuard, TaskEntry};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Stand-in deadline for delays too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub(crate) struct TimerState {
    handle: Handle,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    running: Mutex<HashSet<TaskId>>,
    tick_millis: u64,
    poll: Duration,
    readiness: Arc<dyn ReadinessProbe>,
    faults: Arc<dyn FaultReporter>,
    shutdown: AtomicBool,
}

impl TimerState {
    fn ticks(&self, ticks: u64) -> Duration {
        Duration::from_millis(self.tick_millis.saturating_mul(ticks))
    }

    /// Waits until the host is ready. Returns `false` if cancelled
    /// meanwhile.
    async fn await_ready(&self, id: TaskId, cancelled: &AtomicBool) -> bool {
        let mut logged = false;
        while !self.readiness.is_ready() {
            if cancelled.load(Ordering::Acquire) {
                return false;
            }
            if !logged {
                debug!(task = %id, "host not ready, holding task");
                logged = true;
            }
            sleep(self.poll).await;
        }
        !cancelled.load(Ordering::Acquire)
    }

    /// Runs one execution on the blocking pool and waits for it.
    async fn fire(self: &Arc<Self>, id: TaskId, task: &Arc<dyn Task>) {
        let guard = RunningGuard::enter(Arc::clone(self), id);
        let task = Arc::clone(task);
        let state = Arc::clone(self);
        let body = tokio::task::spawn_blocking(move || {
            let _running = guard;
            if let Err(message) = guarded(|| task.run()) {
                state.faults.report(
                    &RuntimeError::scheduler_fault(id, message),
                    &FaultContext::new(FaultOrigin::Scheduler, id.to_string()),
                );
            }
        });
        if let Err(err) = body.await {
            warn!(task = %id, error = %err, "task body did not complete");
        }
    }

    fn cancel_where(&self, pred: impl Fn(TaskId, &TaskEntry) -> bool) -> usize {
        let mut tasks = self.tasks.lock();
        let ids: Vec<_> = tasks
            .iter()
            .filter(|(id, entry)| pred(**id, entry))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(entry) = tasks.remove(id) {
                entry.cancel();
            }
        }
        ids.len()
    }
}

async fn drive(
    state: Arc<TimerState>,
    id: TaskId,
    delay: Duration,
    period: Option<Duration>,
    task: Arc<dyn Task>,
    cancelled: Arc<AtomicBool>,
) {
    let now = Instant::now();
    let start = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);
    let Some(period) = period else {
        sleep_until(start).await;
        if !state.await_ready(id, &cancelled).await {
            return;
        }
        // a one-shot leaves the queue as it starts
        state.tasks.lock().remove(&id);
        state.fire(id, &task).await;
        return;
    };

    let mut interval = interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !state.await_ready(id, &cancelled).await {
            return;
        }
        state.fire(id, &task).await;
        if cancelled.load(Ordering::Acquire) {
            return;
        }
    }
}

/// Stops the timer thread when the last scheduler clone goes away.
struct TimerControl {
    stop: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerControl {
    fn stop(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("scheduler thread panicked");
        }
    }
}

impl Drop for TimerControl {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs tasks after a delay or on a fixed period, measured in ticks.
///
/// Cheap to clone; clones share the timer thread.
///
/// # Example
///
/// ```
/// use reflex_runtime::host::Host;
/// use reflex_runtime::scheduler::Scheduler;
/// use reflex_runtime::RuntimeConfig;
/// use reflex_types::OwnerId;
///
/// let scheduler = Scheduler::start(&RuntimeConfig::default(), &Host::default())
///     .expect("timer thread");
/// let id = scheduler
///     .schedule_once(OwnerId::host(), 20, || Ok(()))
///     .expect("running");
/// assert!(scheduler.is_queued(id));
/// assert!(scheduler.cancel(id));
/// scheduler.shutdown();
/// ```
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<TimerState>,
    control: Arc<TimerControl>,
}

impl Scheduler {
    /// Starts the timer thread.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Config`] if `config` fails validation.
    /// - [`RuntimeError::SchedulerStart`] if the runtime or thread cannot
    ///   be created.
    pub fn start(config: &RuntimeConfig, host: &Host) -> Result<Self, RuntimeError> {
        config
            .validate()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        let name = config.scheduler_thread_name.clone();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name(format!("{name}-worker"))
            .build()
            .map_err(|e| RuntimeError::SchedulerStart(e.to_string()))?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                runtime.shutdown_background();
            })
            .map_err(|e| RuntimeError::SchedulerStart(e.to_string()))?;

        info!(
            thread = %name,
            tick_ms = config.tick_millis,
            poll_ms = config.readiness_poll_millis,
            "scheduler started"
        );

        Ok(Self {
            state: Arc::new(TimerState {
                handle,
                tasks: Mutex::new(HashMap::new()),
                running: Mutex::new(HashSet::new()),
                tick_millis: config.tick_millis,
                poll: config.readiness_poll(),
                readiness: Arc::clone(&host.readiness),
                faults: Arc::clone(&host.faults),
                shutdown: AtomicBool::new(false),
            }),
            control: Arc::new(TimerControl {
                stop: Mutex::new(Some(stop_tx)),
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    // ── Scheduling ───────────────────────────────────────────

    /// Runs `task` once after `delay_ticks`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SchedulerShutdown`] after [`shutdown`](Self::shutdown).
    pub fn schedule_once<F>(
        &self,
        owner: OwnerId,
        delay_ticks: u64,
        task: F,
    ) -> Result<TaskId, RuntimeError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule_task(owner, delay_ticks, 0, Arc::new(task))
    }

    /// Runs `task` after `delay_ticks`, then every `period_ticks`.
    ///
    /// A period of zero schedules a single execution.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SchedulerShutdown`] after [`shutdown`](Self::shutdown).
    pub fn schedule_repeating<F>(
        &self,
        owner: OwnerId,
        delay_ticks: u64,
        period_ticks: u64,
        task: F,
    ) -> Result<TaskId, RuntimeError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule_task(owner, delay_ticks, period_ticks, Arc::new(task))
    }

    /// Runs `task` as soon as the host is ready.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SchedulerShutdown`] after [`shutdown`](Self::shutdown).
    pub fn run_async<F>(&self, owner: OwnerId, task: F) -> Result<TaskId, RuntimeError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule_task(owner, 0, 0, Arc::new(task))
    }

    /// Schedules a shared task object.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SchedulerShutdown`] after [`shutdown`](Self::shutdown).
    pub fn schedule_task(
        &self,
        owner: OwnerId,
        delay_ticks: u64,
        period_ticks: u64,
        task: Arc<dyn Task>,
    ) -> Result<TaskId, RuntimeError> {
        let state = &self.state;
        if state.shutdown.load(Ordering::Acquire) {
            return Err(RuntimeError::SchedulerShutdown);
        }

        let id = TaskId::next();
        let delay = state.ticks(delay_ticks);
        let period = (period_ticks > 0).then(|| state.ticks(period_ticks));
        let cancelled = Arc::new(AtomicBool::new(false));

        // held across spawn so a fast one-shot cannot remove itself first
        let mut tasks = state.tasks.lock();
        let join = state.handle.spawn(drive(
            Arc::clone(state),
            id,
            delay,
            period,
            task,
            Arc::clone(&cancelled),
        ));
        tasks.insert(
            id,
            TaskEntry {
                owner: owner.clone(),
                cancelled,
                abort: join.abort_handle(),
            },
        );
        debug!(
            task = %id,
            owner = %owner,
            delay_ticks,
            period_ticks,
            "scheduled"
        );
        Ok(id)
    }

    // ── Cancellation ─────────────────────────────────────────

    /// Stops future firings of `id`. Returns `false` if it is not queued.
    pub fn cancel(&self, id: TaskId) -> bool {
        let removed = self.state.cancel_where(|task, _| task == id) > 0;
        if removed {
            debug!(task = %id, "cancelled");
        }
        removed
    }

    /// Cancels every task scheduled by `owner`; returns the count.
    pub fn cancel_all(&self, owner: &OwnerId) -> usize {
        let cancelled = self.state.cancel_where(|_, entry| &entry.owner == owner);
        debug!(owner = %owner, cancelled, "cancelled by owner");
        cancelled
    }

    // ── Introspection ────────────────────────────────────────

    /// Returns `true` if `id` will fire again.
    #[must_use]
    pub fn is_queued(&self, id: TaskId) -> bool {
        self.state.tasks.lock().contains_key(&id)
    }

    /// Returns `true` while a body of `id` is executing.
    #[must_use]
    pub fn is_currently_running(&self, id: TaskId) -> bool {
        self.state.running.lock().contains(&id)
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.tasks.lock().len()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.state.shutdown.load(Ordering::Acquire)
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Drops every queued task and stops the timer thread.
    ///
    /// Bodies already executing finish on their worker. Idempotent.
    pub fn shutdown(&self) {
        if self.state.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = self.state.cancel_where(|_, _| true);
        self.control.stop();
        info!(dropped, "scheduler stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_count())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
