//! Instrumentation around trigger bodies.

use crate::dispatch::Trigger;
use crate::error::RuntimeError;
use reflex_event::EventRef;
use std::time::Duration;
use tracing::{debug, trace};

/// Called immediately before and after each trigger body.
///
/// Observers see every execution, including failed ones. A panicking
/// observer is reported as [`RuntimeError::ObserverFault`] and dispatch
/// carries on unchanged.
pub trait TriggerObserver: Send + Sync {
    /// The body is about to run.
    fn before(&self, trigger: &Trigger, event: &EventRef) {
        let _ = (trigger, event);
    }

    /// The body finished; `error` is set if it failed.
    fn after(
        &self,
        trigger: &Trigger,
        event: &EventRef,
        elapsed: Duration,
        error: Option<&RuntimeError>,
    ) {
        let _ = (trigger, event, elapsed, error);
    }
}

/// Logs trigger timings through `tracing`. The default observer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TriggerObserver for TracingObserver {
    fn before(&self, trigger: &Trigger, event: &EventRef) {
        trace!(
            trigger = trigger.name(),
            event_type = %event.event_type(),
            "trigger start"
        );
    }

    fn after(
        &self,
        trigger: &Trigger,
        event: &EventRef,
        elapsed: Duration,
        error: Option<&RuntimeError>,
    ) {
        debug!(
            trigger = trigger.name(),
            event_type = %event.event_type(),
            elapsed_us = elapsed.as_micros() as u64,
            ok = error.is_none(),
            "trigger finished"
        );
    }
}
