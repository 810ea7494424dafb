//! The event contract and the shared event handle.

use crate::{Cancellable, EventError, EventType};
use std::any::{type_name, Any};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Upcast helper so `dyn Event` can be downcast to its concrete type.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A runtime-typed occurrence published for potential handling.
///
/// # Example
///
/// ```
/// use reflex_event::{CancelFlag, Cancellable, Event, EventType};
///
/// static CHAT: EventType = EventType::root("chat");
///
/// #[derive(Debug)]
/// struct Chat {
///     message: String,
///     cancel: CancelFlag,
/// }
///
/// impl Event for Chat {
///     fn event_type(&self) -> EventType {
///         CHAT
///     }
///
///     fn cancellable(&self) -> Option<&dyn Cancellable> {
///         Some(&self.cancel)
///     }
/// }
///
/// let chat = Chat { message: "hi".into(), cancel: CancelFlag::new() };
/// let event: &dyn Event = &chat;
/// event.set_cancelled(true).expect("chat is cancellable");
/// assert!(event.is_cancelled());
/// assert_eq!(event.downcast_ref::<Chat>().map(|c| c.message.as_str()), Some("hi"));
/// ```
pub trait Event: AsAny + Send + Sync + fmt::Debug {
    /// The runtime type of this instance.
    fn event_type(&self) -> EventType;

    /// The cancellation capability, if this event supports it.
    fn cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }
}

impl dyn Event {
    /// Returns `true` if the event supports cancellation.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.cancellable().is_some()
    }

    /// Returns `true` if the event is cancellable and cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellable().is_some_and(|c| c.is_cancelled())
    }

    /// Sets the cancelled state.
    ///
    /// # Errors
    ///
    /// [`EventError::NotCancellable`] if the event lacks the capability.
    pub fn set_cancelled(&self, cancelled: bool) -> Result<(), EventError> {
        let cancellable = self.cancellable().ok_or(EventError::NotCancellable {
            event_type: self.event_type().name(),
        })?;
        cancellable.set_cancelled(cancelled);
        Ok(())
    }

    /// Returns `true` if the concrete payload is a `T`.
    #[must_use]
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcasts to the concrete payload type.
    #[must_use]
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Downcasts to the concrete payload type, or explains why not.
    ///
    /// # Errors
    ///
    /// [`EventError::TypeMismatch`] if the payload is not a `T`.
    pub fn payload<T: Event>(&self) -> Result<&T, EventError> {
        self.downcast_ref::<T>().ok_or(EventError::TypeMismatch {
            expected: type_name::<T>(),
            actual: self.event_type().name(),
        })
    }
}

/// A published event, shared by every handler of one `publish` call.
///
/// Cloning is cheap (one `Arc`). The handle derefs to `dyn Event`.
#[derive(Clone)]
pub struct EventRef {
    inner: Arc<dyn Event>,
}

impl EventRef {
    /// Wraps a concrete event.
    #[must_use]
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    /// Wraps an already shared event.
    #[must_use]
    pub fn from_arc(inner: Arc<dyn Event>) -> Self {
        Self { inner }
    }

    /// Returns the shared event.
    #[must_use]
    pub fn as_arc(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Returns `true` if both handles point to the same event instance.
    #[must_use]
    pub fn same_instance(&self, other: &EventRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for EventRef {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRef")
            .field("event_type", &self.inner.event_type())
            .field("event", &self.inner)
            .finish()
    }
}

impl<E: Event> From<E> for EventRef {
    fn from(event: E) -> Self {
        Self::new(event)
    }
}
