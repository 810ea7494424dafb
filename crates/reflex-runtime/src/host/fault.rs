//! Fault reporting.

use crate::error::{FaultContext, RuntimeError};
use parking_lot::Mutex;
use reflex_types::ErrorCode;
use std::sync::Arc;

/// Receives every fault the runtime catches instead of propagating it.
///
/// Called from whichever thread caught the fault (publisher, primary,
/// or timer thread). Implementations must not panic.
pub trait FaultReporter: Send + Sync {
    /// Reports one fault.
    fn report(&self, error: &RuntimeError, context: &FaultContext);
}

impl<F> FaultReporter for F
where
    F: Fn(&RuntimeError, &FaultContext) + Send + Sync,
{
    fn report(&self, error: &RuntimeError, context: &FaultContext) {
        self(error, context);
    }
}

/// Logs faults with `tracing::error!`. The default reporter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn report(&self, error: &RuntimeError, context: &FaultContext) {
        tracing::error!(
            code = error.code(),
            origin = %context.origin,
            label = %context.label,
            event_type = context.event_type.map(|t| t.name()),
            "{error}"
        );
    }
}

/// A fault captured by [`CollectingFaultReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFault {
    /// The error.
    pub error: RuntimeError,
    /// Where it was caught.
    pub context: FaultContext,
}

/// Stores every reported fault in memory.
///
/// Clones share the same storage, so a test can keep one clone and hand
/// another to the runtime.
#[derive(Debug, Default, Clone)]
pub struct CollectingFaultReporter {
    faults: Arc<Mutex<Vec<ReportedFault>>>,
}

impl CollectingFaultReporter {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected faults in report order.
    #[must_use]
    pub fn faults(&self) -> Vec<ReportedFault> {
        self.faults.lock().clone()
    }

    /// Returns the error codes in report order.
    #[must_use]
    pub fn codes(&self) -> Vec<&'static str> {
        self.faults.lock().iter().map(|f| f.error.code()).collect()
    }

    /// Returns the number of collected faults.
    #[must_use]
    pub fn len(&self) -> usize {
        self.faults.lock().len()
    }

    /// Returns `true` if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all collected faults.
    pub fn clear(&self) {
        self.faults.lock().clear();
    }
}

impl FaultReporter for CollectingFaultReporter {
    fn report(&self, error: &RuntimeError, context: &FaultContext) {
        self.faults.lock().push(ReportedFault {
            error: error.clone(),
            context: context.clone(),
        });
    }
}
