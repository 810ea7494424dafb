//! Event contract for the reflex automation runtime.
//!
//! This crate defines what the runtime needs to know about an event and
//! nothing more: its runtime [`EventType`] (with supertypes), and the
//! optional [`Cancellable`] capability. Concrete event catalogues live in
//! the host.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Contract Layer                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  reflex-types   : IDs, Priority, ErrorCode                  │
//! │  reflex-event   : Event, EventType, Cancellable   ◄── HERE   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Event Flow
//!
//! ```text
//! host ── publish(EventRef) ──► EventBus
//!                                 │ subscribers bound to the runtime
//!                                 │ type or any of its ancestors
//!                                 ▼
//!                     tier Lowest … tier Monitor
//!                                 │
//!                                 ▼
//!                  final cancelled state returned to host
//! ```
//!
//! # Usage
//!
//! ```
//! use reflex_event::{CancelFlag, Cancellable, Event, EventRef, EventType};
//!
//! static PLAYER: EventType = EventType::root("player");
//! static JOIN: EventType = EventType::extends("player.join", &PLAYER);
//!
//! #[derive(Debug, Default)]
//! struct Join {
//!     name: String,
//!     cancel: CancelFlag,
//! }
//!
//! impl Event for Join {
//!     fn event_type(&self) -> EventType {
//!         JOIN
//!     }
//!
//!     fn cancellable(&self) -> Option<&dyn Cancellable> {
//!         Some(&self.cancel)
//!     }
//! }
//!
//! let event = EventRef::new(Join { name: "ada".into(), ..Default::default() });
//! assert!(PLAYER.is_assignable_from(&event.event_type()));
//! ```
//!
//! # Crate Structure
//!
//! - [`Event`], [`EventRef`] - The event contract and shared handle
//! - [`EventType`], [`ANY_EVENT`] - Runtime types and hierarchy
//! - [`Cancellable`], [`CancelFlag`] - Cancellation capability
//! - [`GenericEvent`] - JSON-payload event
//! - [`EventError`] - Misuse errors

mod cancel;
mod error;
mod event;
mod event_type;
mod generic;

pub use cancel::{CancelFlag, Cancellable};
pub use error::EventError;
pub use event::{AsAny, Event, EventRef};
pub use event_type::{Ancestors, EventType, ANY_EVENT};
pub use generic::GenericEvent;

pub use reflex_types::Priority;
