//! Host readiness, consulted by the scheduler before each execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reports whether the host has finished starting up.
///
/// While `is_ready` returns `false`, due scheduled executions wait just
/// before running. They are neither dropped nor fired early.
pub trait ReadinessProbe: Send + Sync {
    /// Returns `true` once the host can accept scheduled work.
    fn is_ready(&self) -> bool;
}

impl<F> ReadinessProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_ready(&self) -> bool {
        self()
    }
}

/// A probe that is always ready. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReady;

impl ReadinessProbe for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }
}

/// A shared switch the host flips when startup completes.
///
/// # Example
///
/// ```
/// use reflex_runtime::{ReadinessFlag, ReadinessProbe};
///
/// let flag = ReadinessFlag::new(false);
/// let probe = flag.clone();
/// assert!(!probe.is_ready());
/// flag.set_ready(true);
/// assert!(probe.is_ready());
/// ```
#[derive(Debug, Default, Clone)]
pub struct ReadinessFlag(Arc<AtomicBool>);

impl ReadinessFlag {
    /// Creates a flag in the given state.
    #[must_use]
    pub fn new(ready: bool) -> Self {
        Self(Arc::new(AtomicBool::new(ready)))
    }

    /// Sets the state; visible to every clone.
    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }
}

impl ReadinessProbe for ReadinessFlag {
    fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
