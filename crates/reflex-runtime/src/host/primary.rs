//! Primary-thread affinity.
//!
//! The host owns one primary thread that may touch domain state. Triggers
//! that cannot run asynchronously are marshalled onto it:
//!
//! ```text
//! publisher thread                       primary thread
//! ────────────────                       ──────────────
//! run_on_primary(job) ──── mpsc ───────► PrimaryPump::run_pending()
//!        │ blocks                               │ runs job
//!        ◄─────────── done (sync channel) ──────┘
//! ```
//!
//! The hand-off blocks the publishing thread until the job completes. A
//! primary thread that stops pumping stalls every publisher waiting on
//! it; no timeout is applied. The wait does not use tokio, so a publisher
//! may itself be running inside a tokio runtime.

use crate::error::{guarded, panic_message, RuntimeError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;

/// A unit of work to run on the primary thread.
pub type PrimaryJob = Box<dyn FnOnce() + Send + 'static>;

/// Submission primitive for primary-thread work.
pub trait PrimaryThread: Send + Sync {
    /// Returns `true` if the calling thread is the primary thread.
    fn is_primary(&self) -> bool;

    /// Runs `job` on the primary thread and blocks until it completes.
    ///
    /// Runs inline when already on the primary thread.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::PrimaryUnavailable`] if the primary side is gone
    /// or the job panicked before signalling completion.
    fn run_on_primary(&self, label: &str, job: PrimaryJob) -> Result<(), RuntimeError>;
}

/// Runs `f` on the primary thread and hands its value back.
///
/// Blocks the caller the same way [`PrimaryThread::run_on_primary`] does;
/// on the primary thread it runs inline.
///
/// # Errors
///
/// - [`RuntimeError::HandlerFault`] if `f` fails or panics.
/// - [`RuntimeError::PrimaryUnavailable`] if the primary side is gone.
pub fn call_on_primary<T, F>(
    primary: &dyn PrimaryThread,
    label: &str,
    f: F,
) -> Result<T, RuntimeError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let slot = Arc::new(parking_lot::Mutex::new(None));
    let out = Arc::clone(&slot);
    primary.run_on_primary(
        label,
        Box::new(move || {
            *out.lock() = Some(guarded(f));
        }),
    )?;

    let result = slot.lock().take();
    match result {
        Some(Ok(value)) => Ok(value),
        Some(Err(message)) => Err(RuntimeError::handler_fault(label, message)),
        None => Err(RuntimeError::PrimaryUnavailable {
            trigger: label.to_string(),
        }),
    }
}

/// Treats every thread as primary. The default for hosts without a
/// thread-affine domain.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePrimary;

impl PrimaryThread for InlinePrimary {
    fn is_primary(&self) -> bool {
        true
    }

    fn run_on_primary(&self, _label: &str, job: PrimaryJob) -> Result<(), RuntimeError> {
        job();
        Ok(())
    }
}

struct PrimaryCall {
    job: PrimaryJob,
    done: SyncSender<()>,
}

/// Submitting half of a primary-thread channel.
///
/// Created with [`PrimaryExecutor::for_current_thread`] on the thread
/// that becomes primary. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PrimaryExecutor {
    thread: ThreadId,
    tx: mpsc::UnboundedSender<PrimaryCall>,
}

impl std::fmt::Debug for PrimaryCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrimaryCall")
    }
}

impl PrimaryExecutor {
    /// Declares the calling thread primary.
    ///
    /// The returned [`PrimaryPump`] must be driven from this same thread.
    #[must_use]
    pub fn for_current_thread() -> (Self, PrimaryPump) {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::current().id();
        (Self { thread, tx }, PrimaryPump { thread, rx })
    }

    /// Returns the primary thread's id.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }
}

impl PrimaryThread for PrimaryExecutor {
    fn is_primary(&self) -> bool {
        thread::current().id() == self.thread
    }

    fn run_on_primary(&self, label: &str, job: PrimaryJob) -> Result<(), RuntimeError> {
        if self.is_primary() {
            job();
            return Ok(());
        }

        let unavailable = || RuntimeError::PrimaryUnavailable {
            trigger: label.to_string(),
        };
        let (done, wait) = sync_channel(1);
        self.tx
            .send(PrimaryCall { job, done })
            .map_err(|_| unavailable())?;
        wait.recv().map_err(|_| unavailable())
    }
}

/// Receiving half; the host drives it from its primary loop.
#[derive(Debug)]
pub struct PrimaryPump {
    thread: ThreadId,
    rx: mpsc::UnboundedReceiver<PrimaryCall>,
}

impl PrimaryPump {
    /// Runs every job queued so far and returns how many ran.
    ///
    /// Call once per host tick.
    pub fn run_pending(&mut self) -> usize {
        debug_assert_eq!(
            thread::current().id(),
            self.thread,
            "PrimaryPump driven off the primary thread"
        );
        let mut ran = 0;
        while let Ok(call) = self.rx.try_recv() {
            Self::run(call);
            ran += 1;
        }
        ran
    }

    /// Runs jobs until every [`PrimaryExecutor`] clone is dropped.
    pub fn run_until_closed(&mut self) {
        while let Some(call) = self.rx.blocking_recv() {
            Self::run(call);
        }
    }

    fn run(call: PrimaryCall) {
        let PrimaryCall { job, done } = call;
        match catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => {
                let _ = done.send(());
            }
            Err(payload) => {
                // dropping `done` wakes the publisher with PrimaryUnavailable
                tracing::warn!(
                    reason = %panic_message(payload.as_ref()),
                    "primary job panicked"
                );
            }
        }
    }
}

/// Checks that primary-only facilities are used on the primary thread.
///
/// With `strict` set (debug builds by default) a violation panics so the
/// bug surfaces at its call site; otherwise it is returned as
/// [`RuntimeError::ThreadAffinityViolation`].
#[derive(Clone)]
pub struct AffinityGuard {
    primary: Arc<dyn PrimaryThread>,
    strict: bool,
}

impl AffinityGuard {
    /// Creates a guard over `primary`.
    #[must_use]
    pub fn new(primary: Arc<dyn PrimaryThread>, strict: bool) -> Self {
        Self { primary, strict }
    }

    /// Returns whether violations panic.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Verifies the caller is on the primary thread.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ThreadAffinityViolation`] when off the primary
    /// thread and not strict.
    ///
    /// # Panics
    ///
    /// When off the primary thread and strict.
    pub fn ensure_primary(&self, facility: &str) -> Result<(), RuntimeError> {
        if self.primary.is_primary() {
            return Ok(());
        }
        let err = RuntimeError::ThreadAffinityViolation {
            facility: facility.to_string(),
        };
        if self.strict {
            panic!("{err}");
        }
        tracing::warn!(facility, "primary-only facility used off the primary thread");
        Err(err)
    }
}

impl std::fmt::Debug for AffinityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityGuard")
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    // ── InlinePrimary ────────────────────────────────────────

    #[test]
    fn inline_runs_immediately() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        InlinePrimary
            .run_on_primary("t", Box::new(move || flag.store(true, Ordering::SeqCst)))
            .expect("inline never fails");
        assert!(ran.load(Ordering::SeqCst));
    }

    // ── Executor / pump ──────────────────────────────────────

    #[test]
    fn executor_runs_inline_on_primary() {
        let (executor, _pump) = PrimaryExecutor::for_current_thread();
        assert!(executor.is_primary());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor
            .run_on_primary("t", Box::new(move || flag.store(true, Ordering::SeqCst)))
            .expect("inline on primary");
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn off_thread_job_runs_on_primary_and_blocks_caller() {
        let (executor, mut pump) = PrimaryExecutor::for_current_thread();
        let primary = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&ran_on);
        let worker = thread::spawn(move || {
            assert!(!executor.is_primary());
            executor.run_on_primary(
                "worker",
                Box::new(move || {
                    *slot.lock().expect("lock") = Some(thread::current().id());
                }),
            )
        });

        while !worker.is_finished() {
            pump.run_pending();
            thread::yield_now();
        }

        worker.join().expect("worker").expect("job completed");
        assert_eq!(*ran_on.lock().expect("lock"), Some(primary));
    }

    #[test]
    fn dropped_pump_reports_unavailable() {
        let (executor, pump) = PrimaryExecutor::for_current_thread();
        drop(pump);

        let result = thread::spawn(move || executor.run_on_primary("late", Box::new(|| {})))
            .join()
            .expect("worker");
        assert_eq!(
            result,
            Err(RuntimeError::PrimaryUnavailable {
                trigger: "late".into()
            })
        );
    }

    #[test]
    fn panicking_job_unblocks_caller() {
        let (executor, mut pump) = PrimaryExecutor::for_current_thread();
        let worker =
            thread::spawn(move || executor.run_on_primary("bad", Box::new(|| panic!("bad job"))));

        while !worker.is_finished() {
            pump.run_pending();
            thread::yield_now();
        }
        let result = worker.join().expect("worker");
        assert!(matches!(result, Err(RuntimeError::PrimaryUnavailable { .. })));
    }

    // ── call_on_primary ──────────────────────────────────────

    #[test]
    fn call_returns_value_computed_on_primary() {
        let (executor, mut pump) = PrimaryExecutor::for_current_thread();
        let primary = thread::current().id();
        let worker = thread::spawn(move || {
            call_on_primary(&executor, "lookup", || Ok(thread::current().id()))
        });

        while !worker.is_finished() {
            pump.run_pending();
            thread::yield_now();
        }
        assert_eq!(worker.join().expect("worker"), Ok(primary));
    }

    #[test]
    fn call_maps_failure_to_handler_fault() {
        let result: Result<u32, _> =
            call_on_primary(&InlinePrimary, "lookup", || anyhow::bail!("no such block"));
        assert_eq!(
            result,
            Err(RuntimeError::handler_fault("lookup", "no such block"))
        );

        let panicked: Result<u32, _> =
            call_on_primary(&InlinePrimary, "lookup", || panic!("world gone"));
        assert_eq!(
            panicked,
            Err(RuntimeError::handler_fault("lookup", "panicked: world gone"))
        );
    }

    #[test]
    fn wait_works_from_inside_a_tokio_runtime() {
        let (executor, mut pump) = PrimaryExecutor::for_current_thread();
        let worker = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            rt.block_on(async { call_on_primary(&executor, "in-async", || Ok(5)) })
        });

        while !worker.is_finished() {
            pump.run_pending();
            thread::yield_now();
        }
        assert_eq!(worker.join().expect("no panic inside the runtime"), Ok(5));
    }

    // ── AffinityGuard ────────────────────────────────────────

    #[test]
    fn lenient_guard_returns_violation() {
        let (executor, _pump) = PrimaryExecutor::for_current_thread();
        let guard = AffinityGuard::new(Arc::new(executor), false);
        assert!(guard.ensure_primary("here").is_ok());

        let result = thread::spawn(move || guard.ensure_primary("world.set_block"))
            .join()
            .expect("no panic when lenient");
        assert_eq!(
            result,
            Err(RuntimeError::ThreadAffinityViolation {
                facility: "world.set_block".into()
            })
        );
    }

    #[test]
    fn strict_guard_panics_off_thread() {
        let (executor, _pump) = PrimaryExecutor::for_current_thread();
        let guard = AffinityGuard::new(Arc::new(executor), true);
        assert!(guard.is_strict());

        let outcome = thread::spawn(move || guard.ensure_primary("world.set_block")).join();
        assert!(outcome.is_err(), "strict guard must panic");
    }
}
