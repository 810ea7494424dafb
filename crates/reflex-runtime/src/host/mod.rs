//! Contracts the runtime needs from its host.
//!
//! | Contract | Used by | Default |
//! |----------|---------|---------|
//! | [`FaultReporter`] | bus, dispatcher, scheduler | [`TracingFaultReporter`] |
//! | [`ReadinessProbe`] | scheduler | [`AlwaysReady`] |
//! | [`PrimaryThread`] | dispatcher | [`InlinePrimary`] |
//! | [`TriggerObserver`] | dispatcher | [`TracingObserver`] |

mod fault;
mod observer;
mod primary;
mod readiness;

pub use fault::{CollectingFaultReporter, FaultReporter, ReportedFault, TracingFaultReporter};
pub use observer::{TracingObserver, TriggerObserver};
pub use primary::{
    call_on_primary, AffinityGuard, InlinePrimary, PrimaryExecutor, PrimaryJob, PrimaryPump,
    PrimaryThread,
};
pub use readiness::{AlwaysReady, ReadinessFlag, ReadinessProbe};

use std::sync::Arc;

/// The host collaborators injected into one runtime instance.
#[derive(Clone)]
pub struct Host {
    /// Receives caught faults.
    pub faults: Arc<dyn FaultReporter>,
    /// Gates scheduled executions.
    pub readiness: Arc<dyn ReadinessProbe>,
    /// Runs primary-affine trigger bodies.
    pub primary: Arc<dyn PrimaryThread>,
    /// Instruments trigger bodies.
    pub observer: Arc<dyn TriggerObserver>,
}

impl Default for Host {
    fn default() -> Self {
        Self {
            faults: Arc::new(TracingFaultReporter),
            readiness: Arc::new(AlwaysReady),
            primary: Arc::new(InlinePrimary),
            observer: Arc::new(TracingObserver),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
