//! Event layer errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`EventError::NotCancellable`] | `EVENT_NOT_CANCELLABLE` | No |
//! | [`EventError::TypeMismatch`] | `EVENT_TYPE_MISMATCH` | No |
//!
//! Both variants indicate a handler that was wired to the wrong event
//! type, so retrying never helps.

use reflex_types::ErrorCode;
use thiserror::Error;

/// Errors raised when a handler uses an event in a way its type forbids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// `set_cancelled` was called on an event without the capability.
    #[error("event type '{event_type}' is not cancellable")]
    NotCancellable {
        /// Runtime type name of the event.
        event_type: &'static str,
    },

    /// A downcast to a concrete payload type failed.
    #[error("expected event payload '{expected}', got event type '{actual}'")]
    TypeMismatch {
        /// Rust type name that was requested.
        expected: &'static str,
        /// Runtime type name of the event.
        actual: &'static str,
    },
}

impl ErrorCode for EventError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotCancellable { .. } => "EVENT_NOT_CANCELLABLE",
            Self::TypeMismatch { .. } => "EVENT_TYPE_MISMATCH",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
