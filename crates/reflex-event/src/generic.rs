//! A JSON-payload event for hosts that do not want one struct per type.

use crate::{CancelFlag, Cancellable, Event, EventType};
use serde::Serialize;
use serde_json::Value;

/// An event carrying a [`serde_json::Value`] payload.
///
/// Useful for bridging host events that are already dynamic, and for
/// scheduled tasks that publish follow-up events.
///
/// # Example
///
/// ```
/// use reflex_event::{EventRef, EventType, GenericEvent};
/// use serde_json::json;
///
/// static ALARM: EventType = EventType::root("alarm");
///
/// let event = EventRef::new(GenericEvent::cancellable(ALARM, json!({"zone": 3})));
/// let alarm = event.payload::<GenericEvent>().expect("generic payload");
/// assert_eq!(alarm.data()["zone"], 3);
/// assert!(event.is_cancellable());
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct GenericEvent {
    event_type: EventType,
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled: Option<CancelFlag>,
}

impl GenericEvent {
    /// Creates a non-cancellable event.
    #[must_use]
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            cancelled: None,
        }
    }

    /// Creates a cancellable event.
    #[must_use]
    pub fn cancellable(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            cancelled: Some(CancelFlag::new()),
        }
    }

    /// Returns the payload.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl Event for GenericEvent {
    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn cancellable(&self) -> Option<&dyn Cancellable> {
        self.cancelled.as_ref().map(|c| c as &dyn Cancellable)
    }
}
