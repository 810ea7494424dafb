//! Core types for the reflex automation runtime.
//!
//! This crate provides the foundational, dependency-light types shared by
//! every layer of reflex:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Contract Layer                          │
//! │  (Stable, safe to depend on from host integrations)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  reflex-types   : IDs, Priority, ErrorCode        ◄── HERE   │
//! │  reflex-event   : Event, EventType, Cancellable             │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runtime Layer                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  reflex-runtime : bus, dispatch, chain, scheduler, core     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifier Design
//!
//! Handles that only live inside one runtime instance
//! ([`SubscriptionId`], [`TaskId`]) are process-local sequence numbers.
//! Identities that a host may persist or log across restarts
//! ([`TriggerId`], [`OwnerId`]) are UUID-based.
//!
//! # Example
//!
//! ```
//! use reflex_types::{OwnerId, Priority, TriggerId};
//!
//! // Named owners have deterministic UUIDs
//! let a = OwnerId::named("scripts/welcome.rx");
//! let b = OwnerId::named("scripts/welcome.rx");
//! assert_eq!(a, b);
//!
//! // Triggers get random UUIDs
//! assert_ne!(TriggerId::new(), TriggerId::new());
//!
//! // Priority tiers are ordered, lowest first
//! assert!(Priority::Low < Priority::Normal);
//! ```

mod error;
mod id;
mod priority;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{OwnerId, SubscriptionId, TaskId, TriggerId};
pub use priority::{ParsePriorityError, Priority};
