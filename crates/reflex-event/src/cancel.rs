//! The optional cancellation capability.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};

/// Capability letting an event be marked cancelled.
///
/// Cancellation is cooperative: it never stops the handler that set it.
/// Later handlers observe the flag and may be skipped (see the bus's
/// `ignore_cancelled` flag and the dispatcher's mandatory skip).
///
/// Methods take `&self` because events are shared between handlers;
/// implementations use interior mutability, usually a [`CancelFlag`].
pub trait Cancellable: Send + Sync {
    /// Returns `true` if the event has been cancelled.
    fn is_cancelled(&self) -> bool;

    /// Sets the cancelled state.
    fn set_cancelled(&self, cancelled: bool);
}

/// Thread-safe cancelled flag for embedding in event structs.
///
/// # Example
///
/// ```
/// use reflex_event::{CancelFlag, Cancellable};
///
/// let flag = CancelFlag::new();
/// assert!(!flag.is_cancelled());
/// flag.set_cancelled(true);
/// assert!(flag.is_cancelled());
/// ```
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// Creates a flag in the "not cancelled" state.
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }
}

impl Cancellable for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set_cancelled(&self, cancelled: bool) {
        self.0.store(cancelled, Ordering::Release);
    }
}

impl Clone for CancelFlag {
    fn clone(&self) -> Self {
        Self(AtomicBool::new(self.is_cancelled()))
    }
}

impl Serialize for CancelFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_cancelled())
    }
}
