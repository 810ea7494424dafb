//! Reflex Runtime - event-driven automation for an embedding host.
//!
//! The host publishes typed events; scripts (or any other author) react
//! through bus handlers or compiled triggers, and defer work through a
//! tick-based scheduler.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Contract Layer                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  reflex-types   : IDs, Priority, ErrorCode                  │
//! │  reflex-event   : Event, EventType, Cancellable             │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  bus/       : EventBus, Subscription, HandlerTable          │
//! │  dispatch/  : Dispatcher, Trigger, ThreadAffinity           │
//! │  chain/     : Statement, Chain, Interpreter                 │
//! │  scheduler/ : Scheduler, Task                               │
//! │  host/      : FaultReporter, ReadinessProbe, PrimaryThread  │
//! │  runtime    : RuntimeCore (one isolated instance)           │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Host                                  │
//! │  (event catalogue, script front end, primary loop)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! ## [`bus`] - Publish/Subscribe
//!
//! - [`EventBus`](bus::EventBus): type-indexed, priority-tiered delivery
//! - [`HandlerTable`](bus::HandlerTable) / [`Listener`](bus::Listener):
//!   bulk registration keyed by instance or name
//!
//! ## [`dispatch`] - Triggers
//!
//! - [`Trigger`](dispatch::Trigger): condition + action chain bound to
//!   event types
//! - [`Dispatcher`](dispatch::Dispatcher): one bus subscription per
//!   (event type, priority), cancellation skip, primary-thread marshalling
//!
//! ## [`chain`] - Trigger Bodies
//!
//! - [`Statement`](chain::Statement): effects, gates, loops, conditionals
//! - [`Interpreter`](chain::Interpreter): walks a compiled
//!   [`Chain`](chain::Chain) with per-invocation loop counters
//!
//! ## [`scheduler`] - Deferred Work
//!
//! - [`Scheduler`](scheduler::Scheduler): delays and periods in ticks,
//!   gated on host readiness
//!
//! ## [`host`] - Host Contracts
//!
//! Everything the runtime needs from its embedder, with defaults.
//!
//! ## [`config`] - Configuration
//!
//! - [`RuntimeConfig`]: TOML + `REFLEX_*` environment overrides
//!
//! # Fault Containment
//!
//! User code never unwinds into the runtime. Errors and panics from
//! handlers, trigger bodies, predicates, observers and tasks become a
//! [`RuntimeError`] delivered to the [`FaultReporter`] with a
//! [`FaultContext`]; the surrounding dispatch or schedule carries on.

pub mod bus;
pub mod chain;
pub mod config;
pub mod dispatch;
mod error;
pub mod host;
mod runtime;
pub mod scheduler;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for convenience
pub use bus::{EventBus, SubscribeOptions, Subscription};
pub use chain::{ExecutionContext, Statement};
pub use config::{ConfigError, RuntimeConfig};
pub use dispatch::{Dispatcher, ThreadAffinity, Trigger};
pub use error::{FaultContext, FaultOrigin, RuntimeError};
pub use host::{
    FaultReporter, Host, PrimaryExecutor, PrimaryPump, PrimaryThread, ReadinessFlag,
    ReadinessProbe, TriggerObserver,
};
pub use runtime::{RuntimeCore, RuntimeCoreBuilder, UnloadSummary};
pub use scheduler::Scheduler;
