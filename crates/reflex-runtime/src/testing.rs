//! Test helpers shared by unit and integration tests.
//!
//! Enabled for this crate's tests and, for downstream crates, with the
//! `test-utils` feature.

use crate::chain::Statement;
use parking_lot::Mutex;
use reflex_event::{EventRef, EventType, GenericEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use crate::host::CollectingFaultReporter;

/// A small event hierarchy.
///
/// ```text
/// entity ── entity.player ─┬─ entity.player.join
///                          └─ entity.player.chat
/// tick
/// ```
pub mod test_event_types {
    use reflex_event::EventType;

    /// Root of the entity hierarchy.
    pub static ENTITY: EventType = EventType::root("entity");
    /// A player entity.
    pub static PLAYER: EventType = EventType::extends("entity.player", &ENTITY);
    /// A player joined.
    pub static JOIN: EventType = EventType::extends("entity.player.join", &PLAYER);
    /// A player chatted.
    pub static CHAT: EventType = EventType::extends("entity.player.chat", &PLAYER);
    /// Unrelated root type.
    pub static TICK: EventType = EventType::root("tick");
}

/// A cancellable event of `event_type` with a null payload.
#[must_use]
pub fn cancellable_event(event_type: EventType) -> EventRef {
    EventRef::new(GenericEvent::cancellable(event_type, serde_json::Value::Null))
}

/// A non-cancellable event of `event_type` with a null payload.
#[must_use]
pub fn plain_event(event_type: EventType) -> EventRef {
    EventRef::new(GenericEvent::new(event_type, serde_json::Value::Null))
}

/// Ordered log of invocations, shared across clones.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of every entry in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forgets every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// A bus handler that records `label`.
    pub fn handler(
        &self,
        label: impl Into<String>,
    ) -> impl Fn(&EventRef) -> anyhow::Result<()> + Send + Sync + 'static {
        let rec = self.clone();
        let label = label.into();
        move |_event: &EventRef| {
            rec.record(label.clone());
            Ok(())
        }
    }

    /// A chain effect that records `label`.
    pub fn effect(&self, label: impl Into<String>) -> Statement {
        let rec = self.clone();
        let label = label.into();
        Statement::effect(move |_| {
            rec.record(label.clone());
            Ok(())
        })
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
