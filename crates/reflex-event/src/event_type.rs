//! Runtime event types and their hierarchy.
//!
//! Every [`Event`](crate::Event) reports an [`EventType`]. Types form a
//! single-parent tree declared with `static` items, and every type
//! implicitly descends from [`ANY_EVENT`]:
//!
//! ```text
//! *                      (ANY_EVENT, implicit root)
//! └── player
//!     ├── player.join
//!     └── player.chat
//! ```
//!
//! A subscriber bound to `player` receives `player.join` and
//! `player.chat` instances (covariant matching).

use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The implicit root of every event type.
///
/// Subscribing to `ANY_EVENT` receives every published event.
pub static ANY_EVENT: EventType = EventType::root("*");

/// A static event type descriptor.
///
/// Identity is the `name`; names must be unique inside one runtime.
/// Dotted paths (`"player.join"`) are the convention.
///
/// # Example
///
/// ```
/// use reflex_event::{EventType, ANY_EVENT};
///
/// static PLAYER: EventType = EventType::root("player");
/// static JOIN: EventType = EventType::extends("player.join", &PLAYER);
/// static TICK: EventType = EventType::root("tick");
///
/// assert!(PLAYER.is_assignable_from(&JOIN));
/// assert!(!JOIN.is_assignable_from(&PLAYER));
/// assert!(!TICK.is_assignable_from(&JOIN));
/// assert!(ANY_EVENT.is_assignable_from(&TICK));
/// assert_eq!(JOIN.depth(), 1);
/// ```
#[derive(Clone, Copy)]
pub struct EventType {
    name: &'static str,
    parent: Option<&'static EventType>,
}

impl EventType {
    /// Declares a type with no explicit parent.
    #[must_use]
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Declares a subtype of `parent`.
    #[must_use]
    pub const fn extends(name: &'static str, parent: &'static EventType) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the direct parent, if declared.
    #[must_use]
    pub fn parent(&self) -> Option<EventType> {
        self.parent.copied()
    }

    /// Returns `true` for [`ANY_EVENT`].
    #[must_use]
    pub fn is_any(&self) -> bool {
        *self == ANY_EVENT
    }

    /// Number of declared ancestors (0 for a root).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    /// Iterates `self`, then each declared parent up to the root.
    ///
    /// [`ANY_EVENT`] is not yielded unless `self` is `ANY_EVENT`.
    #[must_use]
    pub fn ancestors(&self) -> Ancestors {
        Ancestors { next: Some(*self) }
    }

    /// Returns `true` if an instance of `other` may be delivered to a
    /// subscriber bound to `self`.
    #[must_use]
    pub fn is_assignable_from(&self, other: &EventType) -> bool {
        self.is_any() || other.ancestors().any(|t| t == *self)
    }

    /// Distance from `other` up to `self`, or `None` if unrelated.
    ///
    /// `Some(0)` means the same type; [`ANY_EVENT`] is one step above
    /// the root of `other`.
    #[must_use]
    pub fn distance_from(&self, other: &EventType) -> Option<usize> {
        if let Some(pos) = other.ancestors().position(|t| t == *self) {
            return Some(pos);
        }
        self.is_any().then(|| other.depth() + 1)
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// Iterator returned by [`EventType::ancestors`].
pub struct Ancestors {
    next: Option<EventType>,
}

impl Iterator for Ancestors {
    type Item = EventType;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}
