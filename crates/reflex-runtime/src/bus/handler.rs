//! Handlers and the registration table used for bulk subscription.

use reflex_event::{EventRef, EventType};
use reflex_types::Priority;
use std::sync::Arc;

/// A bus subscriber callback.
///
/// Returning `Err` or panicking is isolated: the fault is reported and
/// the remaining handlers still run.
pub trait Handler: Send + Sync + 'static {
    /// Handles one published event.
    ///
    /// # Errors
    ///
    /// Any error; it is reported as a handler fault.
    fn handle(&self, event: &EventRef) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&EventRef) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, event: &EventRef) -> anyhow::Result<()> {
        self(event)
    }
}

/// One row of a [`HandlerTable`].
#[derive(Clone)]
pub struct HandlerEntry {
    pub(crate) event_type: EventType,
    pub(crate) priority: Priority,
    pub(crate) ignore_cancelled: bool,
    pub(crate) handler: Arc<dyn Handler>,
}

impl HandlerEntry {
    /// The bound event type.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The tier.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .finish_non_exhaustive()
    }
}

/// An explicit table of handlers, registered in one call.
///
/// `on` uses [`Priority::Normal`] and skips already-cancelled events;
/// `on_with` sets both explicitly.
///
/// # Example
///
/// ```
/// use reflex_event::EventType;
/// use reflex_runtime::bus::HandlerTable;
/// use reflex_types::Priority;
///
/// static JOIN: EventType = EventType::root("join");
/// static QUIT: EventType = EventType::root("quit");
///
/// let table = HandlerTable::new()
///     .on(JOIN, |_| Ok(()))
///     .on_with(QUIT, Priority::Monitor, false, |_| Ok(()));
/// assert_eq!(table.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    entries: Vec<HandlerEntry>,
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a Normal-priority handler that skips cancelled events.
    #[must_use]
    pub fn on<F>(self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(&EventRef) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_with(event_type, Priority::Normal, true, handler)
    }

    /// Adds a handler with explicit tier and cancellation behaviour.
    #[must_use]
    pub fn on_with<F>(
        self,
        event_type: EventType,
        priority: Priority,
        ignore_cancelled: bool,
        handler: F,
    ) -> Self
    where
        F: Fn(&EventRef) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handler(event_type, priority, ignore_cancelled, Arc::new(handler))
    }

    /// Adds an already shared handler.
    #[must_use]
    pub fn handler(
        mut self,
        event_type: EventType,
        priority: Priority,
        ignore_cancelled: bool,
        handler: Arc<dyn Handler>,
    ) -> Self {
        self.entries.push(HandlerEntry {
            event_type,
            priority,
            ignore_cancelled,
            handler,
        });
        self
    }

    /// Returns the rows.
    #[must_use]
    pub fn entries(&self) -> &[HandlerEntry] {
        &self.entries
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<HandlerEntry> {
        self.entries
    }
}

/// An object that exposes its handlers as a table.
///
/// Subscribing a listener keys every resulting subscription by the
/// listener's identity, so `unsubscribe_listener` removes them together.
///
/// # Example
///
/// ```
/// use reflex_event::EventType;
/// use reflex_runtime::bus::{HandlerTable, Listener};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// static JOIN: EventType = EventType::root("join");
///
/// #[derive(Default)]
/// struct Greeter {
///     greeted: AtomicUsize,
/// }
///
/// impl Listener for Greeter {
///     fn handlers(self: Arc<Self>) -> HandlerTable {
///         HandlerTable::new().on(JOIN, move |_| {
///             self.greeted.fetch_add(1, Ordering::Relaxed);
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Listener: Send + Sync + 'static {
    /// Builds this listener's handler table.
    fn handlers(self: Arc<Self>) -> HandlerTable;
}
