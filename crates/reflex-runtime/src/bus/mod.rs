//! Type-indexed publish/subscribe with priority tiers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           EventBus                             │
//! │                                                                │
//! │  index: EventType ──► Arc<Vec<Arc<Subscriber>>>  (copy-on-write)│
//! │                                                                │
//! │  publish(event: entity.player.join)                            │
//! │    1. snapshot lists for join, player, entity and *            │
//! │    2. merge, order by (priority, registration)                 │
//! │    3. invoke; skip inactive and ignore_cancelled+cancelled     │
//! │    4. return event.is_cancelled()                              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! `publish` may run concurrently with subscribe/unsubscribe. A publish
//! works on the snapshot it took at entry: subscriptions added later are
//! not seen, and subscriptions removed before their turn are skipped via
//! an `active` flag. Handlers run with no bus lock held, so they may
//! publish, subscribe and unsubscribe freely.
//!
//! # Keys
//!
//! Every subscription is reachable by its [`Subscription`] handle and by
//! its handler pointer. Listener and static tables add an identity key,
//! and options may add an [`OwnerId`].

mod handler;
mod subscription;

pub use handler::{Handler, HandlerEntry, HandlerTable, Listener};
pub use subscription::{SubscribeOptions, Subscription};

use crate::error::{guarded, FaultContext, FaultOrigin, RuntimeError};
use crate::host::{FaultReporter, TracingFaultReporter};
use parking_lot::RwLock;
use reflex_event::{EventRef, EventType, ANY_EVENT};
use reflex_types::{OwnerId, Priority, SubscriptionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// How a subscription was registered, for keyed removal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubscriberKey {
    Direct,
    Listener(usize),
    Static(String),
}

pub(crate) struct Subscriber {
    pub(crate) id: SubscriptionId,
    event_type: EventType,
    priority: Priority,
    ignore_cancelled: bool,
    handler: Arc<dyn Handler>,
    key: SubscriberKey,
    owner: Option<OwnerId>,
    active: AtomicBool,
}

impl Subscriber {
    fn handler_addr(&self) -> usize {
        Arc::as_ptr(&self.handler) as *const () as usize
    }
}

type SubscriberList = Arc<Vec<Arc<Subscriber>>>;

pub(crate) struct BusInner {
    index: RwLock<HashMap<EventType, SubscriberList>>,
    faults: Arc<dyn FaultReporter>,
}

impl BusInner {
    fn insert(&self, subscriber: Subscriber) {
        let subscriber = Arc::new(subscriber);
        let mut index = self.index.write();
        let list = index.entry(subscriber.event_type).or_default();
        let mut next = Vec::with_capacity(list.len() + 1);
        next.extend(list.iter().cloned());
        next.push(subscriber);
        *list = Arc::new(next);
    }

    /// Removes every subscriber matching `pred`; returns the count.
    pub(crate) fn remove_where(&self, pred: impl Fn(&Subscriber) -> bool) -> usize {
        let mut removed = 0;
        let mut index = self.index.write();
        index.retain(|_, list| {
            if !list.iter().any(|s| pred(&**s)) {
                return true;
            }
            let mut kept = Vec::with_capacity(list.len());
            for s in list.iter() {
                if pred(&**s) {
                    s.active.store(false, Ordering::Release);
                    removed += 1;
                } else {
                    kept.push(Arc::clone(s));
                }
            }
            *list = Arc::new(kept);
            !list.is_empty()
        });
        removed
    }

    pub(crate) fn contains(&self, event_type: EventType, id: SubscriptionId) -> bool {
        self.index
            .read()
            .get(&event_type)
            .is_some_and(|list| list.iter().any(|s| s.id == id))
    }
}

/// The event bus. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus reporting handler faults to `faults`.
    #[must_use]
    pub fn new(faults: Arc<dyn FaultReporter>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                index: RwLock::new(HashMap::new()),
                faults,
            }),
        }
    }

    // ── Subscribe ────────────────────────────────────────────

    /// Subscribes a closure.
    ///
    /// The handler receives every published event whose runtime type is
    /// `event_type` or a subtype of it.
    pub fn subscribe<F>(
        &self,
        event_type: EventType,
        priority: Priority,
        ignore_cancelled: bool,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&EventRef) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let options = SubscribeOptions::new()
            .priority(priority)
            .ignore_cancelled(ignore_cancelled);
        self.subscribe_with(event_type, options, Arc::new(handler))
    }

    /// Subscribes a shared handler with explicit options.
    pub fn subscribe_with(
        &self,
        event_type: EventType,
        options: SubscribeOptions,
        handler: Arc<dyn Handler>,
    ) -> Subscription {
        self.insert(event_type, options, handler, SubscriberKey::Direct)
    }

    /// Subscribes every handler of `listener`, keyed by its identity.
    pub fn subscribe_listener<L: Listener>(&self, listener: &Arc<L>) -> Vec<Subscription> {
        let key = SubscriberKey::Listener(listener_addr(listener));
        let table = Arc::clone(listener).handlers();
        self.insert_table(table, &key)
    }

    /// Subscribes a table under a static name (the class-level form).
    pub fn subscribe_static(&self, name: &str, table: HandlerTable) -> Vec<Subscription> {
        self.insert_table(table, &SubscriberKey::Static(name.to_string()))
    }

    fn insert_table(&self, table: HandlerTable, key: &SubscriberKey) -> Vec<Subscription> {
        table
            .into_entries()
            .into_iter()
            .map(|entry| {
                let options = SubscribeOptions::new()
                    .priority(entry.priority)
                    .ignore_cancelled(entry.ignore_cancelled);
                self.insert(entry.event_type, options, entry.handler, key.clone())
            })
            .collect()
    }

    fn insert(
        &self,
        event_type: EventType,
        options: SubscribeOptions,
        handler: Arc<dyn Handler>,
        key: SubscriberKey,
    ) -> Subscription {
        let id = SubscriptionId::next();
        debug!(
            subscription = %id,
            event_type = %event_type,
            priority = %options.priority,
            ignore_cancelled = options.ignore_cancelled,
            "subscribe"
        );
        self.inner.insert(Subscriber {
            id,
            event_type,
            priority: options.priority,
            ignore_cancelled: options.ignore_cancelled,
            handler,
            key,
            owner: options.owner,
            active: AtomicBool::new(true),
        });
        Subscription {
            id,
            event_type,
            bus: Arc::downgrade(&self.inner),
        }
    }

    // ── Unsubscribe ──────────────────────────────────────────

    /// Removes one subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.remove(|s| s.id == subscription.id, "handle") > 0
    }

    /// Removes every subscription made by `subscribe_listener(listener)`.
    pub fn unsubscribe_listener<L: Listener>(&self, listener: &Arc<L>) -> usize {
        let key = SubscriberKey::Listener(listener_addr(listener));
        self.remove(|s| s.key == key, "listener")
    }

    /// Removes every subscription made under the static `name`.
    pub fn unsubscribe_static(&self, name: &str) -> usize {
        self.remove(
            |s| matches!(&s.key, SubscriberKey::Static(n) if n == name),
            "static",
        )
    }

    /// Removes every subscription using this handler instance.
    pub fn unsubscribe_handler<H: ?Sized>(&self, handler: &Arc<H>) -> usize {
        let addr = Arc::as_ptr(handler) as *const () as usize;
        self.remove(|s| s.handler_addr() == addr, "handler")
    }

    /// Removes every subscription registered with `owner`.
    pub fn unsubscribe_owner(&self, owner: &OwnerId) -> usize {
        self.remove(|s| s.owner.as_ref() == Some(owner), "owner")
    }

    fn remove(&self, pred: impl Fn(&Subscriber) -> bool, by: &'static str) -> usize {
        let removed = self.inner.remove_where(pred);
        debug!(by, removed, "unsubscribe");
        removed
    }

    // ── Publish ──────────────────────────────────────────────

    /// Delivers `event` to every matching subscriber and returns its
    /// final cancelled state.
    ///
    /// Tiers run in ascending [`Priority`]; inside a tier, registration
    /// order. Handler errors and panics are reported and never stop the
    /// remaining handlers.
    pub fn publish(&self, event: &EventRef) -> bool {
        let event_type = event.event_type();
        let mut batch = self.snapshot(event_type);
        batch.sort_by_key(|s| (s.priority, s.id));

        for subscriber in batch {
            if !subscriber.active.load(Ordering::Acquire) {
                continue;
            }
            if subscriber.ignore_cancelled && event.is_cancelled() {
                trace!(subscription = %subscriber.id, "skipped, event cancelled");
                continue;
            }

            trace!(
                subscription = %subscriber.id,
                event_type = %event_type,
                priority = %subscriber.priority,
                "invoke"
            );
            if let Err(message) = guarded(|| subscriber.handler.handle(event)) {
                self.inner.faults.report(
                    &RuntimeError::subscriber_fault(subscriber.id, message),
                    &FaultContext::new(FaultOrigin::Bus, subscriber.id.to_string())
                        .with_event(event_type),
                );
            }
        }

        event.is_cancelled()
    }

    fn snapshot(&self, event_type: EventType) -> Vec<Arc<Subscriber>> {
        let lists: Vec<SubscriberList> = {
            let index = self.inner.index.read();
            event_type
                .ancestors()
                .chain((!event_type.is_any()).then_some(ANY_EVENT))
                .filter_map(|t| index.get(&t).cloned())
                .collect()
        };
        lists.iter().flat_map(|l| l.iter().cloned()).collect()
    }

    // ── Introspection ────────────────────────────────────────

    /// Returns the total number of subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.index.read().values().map(|l| l.len()).sum()
    }

    /// Returns `true` if publishing an `event_type` instance would reach
    /// at least one subscriber.
    #[must_use]
    pub fn has_subscribers(&self, event_type: EventType) -> bool {
        !self.snapshot(event_type).is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Arc::new(TracingFaultReporter))
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn listener_addr<L>(listener: &Arc<L>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}
