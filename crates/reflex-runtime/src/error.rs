//! Runtime errors and fault context.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`RuntimeError::HandlerFault`] | `RUNTIME_HANDLER_FAULT` | Yes |
//! | [`RuntimeError::SchedulerFault`] | `RUNTIME_SCHEDULER_FAULT` | Yes |
//! | [`RuntimeError::ObserverFault`] | `RUNTIME_OBSERVER_FAULT` | Yes |
//! | [`RuntimeError::StepLimitExceeded`] | `RUNTIME_STEP_LIMIT_EXCEEDED` | Yes |
//! | [`RuntimeError::PrimaryUnavailable`] | `RUNTIME_PRIMARY_UNAVAILABLE` | No |
//! | [`RuntimeError::ThreadAffinityViolation`] | `RUNTIME_THREAD_AFFINITY_VIOLATION` | No |
//! | [`RuntimeError::InvalidTrigger`] | `RUNTIME_INVALID_TRIGGER` | No |
//! | [`RuntimeError::SchedulerStart`] | `RUNTIME_SCHEDULER_START` | No |
//! | [`RuntimeError::SchedulerShutdown`] | `RUNTIME_SCHEDULER_SHUTDOWN` | No |
//! | [`RuntimeError::Config`] | `RUNTIME_CONFIG` | No |
//!
//! Faults raised by user code (handlers, trigger bodies, scheduled tasks)
//! never unwind out of the runtime. They are converted to a
//! [`RuntimeError`] and handed to the [`FaultReporter`](crate::FaultReporter)
//! together with a [`FaultContext`].

use reflex_event::EventType;
use reflex_types::{ErrorCode, SubscriptionId, TaskId};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Errors produced by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A bus handler or trigger body failed or panicked.
    #[error("handler '{handler}' failed: {message}")]
    HandlerFault {
        /// Subscription id or trigger name.
        handler: String,
        /// Error or panic message.
        message: String,
    },

    /// A scheduled task failed or panicked.
    #[error("scheduled task {task} failed: {message}")]
    SchedulerFault {
        /// The failing task.
        task: TaskId,
        /// Error or panic message.
        message: String,
    },

    /// A trigger observer panicked. Dispatch continued regardless.
    #[error("trigger observer failed: {message}")]
    ObserverFault {
        /// Panic message.
        message: String,
    },

    /// A trigger body ran more steps than the configured limit.
    #[error("trigger '{trigger}' exceeded the step limit of {limit}")]
    StepLimitExceeded {
        /// Trigger name.
        trigger: String,
        /// The configured limit.
        limit: u64,
    },

    /// The primary thread stopped accepting work.
    #[error("primary thread unavailable while running '{trigger}'")]
    PrimaryUnavailable {
        /// Trigger that needed the primary thread.
        trigger: String,
    },

    /// A primary-thread-only facility was used from another thread.
    #[error("'{facility}' must be called on the primary thread")]
    ThreadAffinityViolation {
        /// The facility that was misused.
        facility: String,
    },

    /// A trigger definition was rejected at build time.
    #[error("invalid trigger '{name}': {reason}")]
    InvalidTrigger {
        /// Trigger name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The timer thread could not be started.
    #[error("failed to start scheduler: {0}")]
    SchedulerStart(String),

    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    SchedulerShutdown,

    /// The runtime was built with an invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RuntimeError {
    /// Creates a handler fault.
    pub fn handler_fault(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerFault {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Creates a handler fault labelled with a bus subscription.
    pub fn subscriber_fault(id: SubscriptionId, message: impl Into<String>) -> Self {
        Self::handler_fault(id.to_string(), message)
    }

    /// Creates a scheduler fault.
    pub fn scheduler_fault(task: TaskId, message: impl Into<String>) -> Self {
        Self::SchedulerFault {
            task,
            message: message.into(),
        }
    }

    /// Creates an invalid trigger error.
    pub fn invalid_trigger(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for RuntimeError {
    fn code(&self) -> &'static str {
        match self {
            Self::HandlerFault { .. } => "RUNTIME_HANDLER_FAULT",
            Self::SchedulerFault { .. } => "RUNTIME_SCHEDULER_FAULT",
            Self::ObserverFault { .. } => "RUNTIME_OBSERVER_FAULT",
            Self::StepLimitExceeded { .. } => "RUNTIME_STEP_LIMIT_EXCEEDED",
            Self::PrimaryUnavailable { .. } => "RUNTIME_PRIMARY_UNAVAILABLE",
            Self::ThreadAffinityViolation { .. } => "RUNTIME_THREAD_AFFINITY_VIOLATION",
            Self::InvalidTrigger { .. } => "RUNTIME_INVALID_TRIGGER",
            Self::SchedulerStart(_) => "RUNTIME_SCHEDULER_START",
            Self::SchedulerShutdown => "RUNTIME_SCHEDULER_SHUTDOWN",
            Self::Config(_) => "RUNTIME_CONFIG",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::HandlerFault { .. }
                | Self::SchedulerFault { .. }
                | Self::ObserverFault { .. }
                | Self::StepLimitExceeded { .. }
        )
    }
}

/// Where a fault was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOrigin {
    /// A bus subscriber.
    Bus,
    /// A trigger body or match predicate.
    Trigger,
    /// A scheduled task.
    Scheduler,
    /// A trigger observer.
    Observer,
}

impl FaultOrigin {
    /// Returns the lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Trigger => "trigger",
            Self::Scheduler => "scheduler",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for FaultOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context passed to the fault reporter alongside the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultContext {
    /// Where the fault was caught.
    pub origin: FaultOrigin,
    /// Subscription id, trigger name or task id.
    pub label: String,
    /// Event being processed, if any.
    pub event_type: Option<EventType>,
}

impl FaultContext {
    /// Creates a context without an event.
    pub fn new(origin: FaultOrigin, label: impl Into<String>) -> Self {
        Self {
            origin,
            label: label.into(),
            event_type: None,
        }
    }

    /// Attaches the event type being processed.
    #[must_use]
    pub fn with_event(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }
}

/// Runs user code, converting both `Err` and panics into a message.
pub(crate) fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
