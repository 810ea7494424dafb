//! Subscription handles and options.

use super::BusInner;
use reflex_event::EventType;
use reflex_types::{OwnerId, Priority, SubscriptionId};
use std::fmt;
use std::sync::Weak;

/// Options for [`EventBus::subscribe_with`](super::EventBus::subscribe_with).
///
/// Defaults: [`Priority::Normal`], skip cancelled events, no owner.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub(crate) priority: Priority,
    pub(crate) ignore_cancelled: bool,
    pub(crate) owner: Option<OwnerId>,
}

impl SubscribeOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            priority: Priority::Normal,
            ignore_cancelled: true,
            owner: None,
        }
    }

    /// Sets the tier.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets whether already-cancelled events are skipped.
    #[must_use]
    pub fn ignore_cancelled(mut self, ignore: bool) -> Self {
        self.ignore_cancelled = ignore;
        self
    }

    /// Associates the subscription with an owner for bulk removal.
    #[must_use]
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one subscription.
///
/// Removal is idempotent: the first `unsubscribe` removes it, later
/// calls return `false`. The handle does not keep the bus alive.
#[derive(Clone)]
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) event_type: EventType,
    pub(crate) bus: Weak<BusInner>,
}

impl Subscription {
    /// Returns the subscription id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the bound event type.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Removes the subscription. Returns `true` only on the first call.
    pub fn unsubscribe(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.remove_where(|s| s.id == self.id) > 0)
    }

    /// Returns `true` while the subscription is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.contains(self.event_type, self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}
