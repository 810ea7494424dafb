//! Trigger registry and dispatcher.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Dispatcher                              │
//! │                                                                   │
//! │  buckets: (EventType, Priority) ──► [trigger, trigger, ...]       │
//! │               │                        (copy-on-write)            │
//! │               └── one EventBus subscription per bucket (FanOut)   │
//! │                                                                   │
//! │  FanOut(event):                                                   │
//! │    for trigger in bucket snapshot:                                │
//! │      skip if unregistered or event cancelled                      │
//! │      skip unless this bucket is its most specific binding         │
//! │      primary-only and off primary? ── run_on_primary (blocks)     │
//! │      match predicate → observer.before → body → observer.after    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Supertype matching and tier ordering come from the bus: a bucket for
//! `entity` at `High` is a bus subscriber for `entity` at `High`.
//!
//! # Locking
//!
//! The registry lock is taken before any bus lock and is never held
//! while a trigger body runs, so bodies may publish, register and
//! unregister.

mod trigger;

pub use trigger::{ThreadAffinity, Trigger, TriggerBuilder};

use crate::bus::{EventBus, Handler, SubscribeOptions, Subscription};
use crate::chain::Interpreter;
use crate::error::{guarded, FaultContext, FaultOrigin, RuntimeError};
use crate::host::{FaultReporter, Host, PrimaryThread, TriggerObserver};
use parking_lot::RwLock;
use reflex_event::{EventRef, EventType};
use reflex_types::{OwnerId, Priority, TriggerId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    event_type: EventType,
    priority: Priority,
}

struct Registered {
    trigger: Arc<Trigger>,
    active: AtomicBool,
    seq: u64,
}

type TriggerList = Arc<Vec<Arc<Registered>>>;

struct Bucket {
    triggers: TriggerList,
    subscription: Subscription,
}

#[derive(Default)]
struct Registry {
    buckets: HashMap<BucketKey, Bucket>,
    triggers: HashMap<TriggerId, Arc<Registered>>,
}

struct DispatchInner {
    bus: EventBus,
    registry: RwLock<Registry>,
    seq: AtomicU64,
    faults: Arc<dyn FaultReporter>,
    primary: Arc<dyn PrimaryThread>,
    observer: Arc<dyn TriggerObserver>,
    interpreter: Interpreter,
}

/// The bus subscriber installed for one bucket.
struct FanOut {
    dispatcher: Weak<DispatchInner>,
    key: BucketKey,
}

impl Handler for FanOut {
    fn handle(&self, event: &EventRef) -> anyhow::Result<()> {
        if let Some(inner) = self.dispatcher.upgrade() {
            inner.dispatch(self.key, event);
        }
        Ok(())
    }
}

impl DispatchInner {
    fn dispatch(self: &Arc<Self>, key: BucketKey, event: &EventRef) {
        let batch = match self.registry.read().buckets.get(&key) {
            Some(bucket) => Arc::clone(&bucket.triggers),
            None => return,
        };
        let event_type = event.event_type();

        for entry in batch.iter() {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            let trigger = &entry.trigger;
            // contain faults per trigger
            let outcome = guarded(|| {
                self.offer(key, event_type, trigger, event);
                Ok(())
            });
            if let Err(message) = outcome {
                self.faults.report(
                    &RuntimeError::handler_fault(trigger.name(), message),
                    &FaultContext::new(FaultOrigin::Trigger, trigger.name())
                        .with_event(event_type),
                );
            }
        }
    }

    fn offer(
        self: &Arc<Self>,
        key: BucketKey,
        event_type: EventType,
        trigger: &Arc<Trigger>,
        event: &EventRef,
    ) {
        if event.is_cancelled() {
            trace!(trigger = trigger.name(), "skipped, event cancelled");
            return;
        }
        if trigger.binding_for(event_type) != Some(key.event_type) {
            return;
        }

        if trigger.can_execute_asynchronously() || self.primary.is_primary() {
            self.execute(trigger, event);
        } else {
            self.marshal(trigger, event);
        }
    }

    fn marshal(self: &Arc<Self>, trigger: &Arc<Trigger>, event: &EventRef) {
        trace!(trigger = trigger.name(), "marshalling to primary thread");
        let job = {
            let inner = Arc::clone(self);
            let trigger = Arc::clone(trigger);
            let event = event.clone();
            move || inner.execute(&trigger, &event)
        };
        if let Err(err) = self.primary.run_on_primary(trigger.name(), Box::new(job)) {
            self.faults.report(
                &err,
                &FaultContext::new(FaultOrigin::Trigger, trigger.name())
                    .with_event(event.event_type()),
            );
        }
    }

    fn execute(&self, trigger: &Trigger, event: &EventRef) {
        let context = || {
            FaultContext::new(FaultOrigin::Trigger, trigger.name()).with_event(event.event_type())
        };

        match guarded(|| Ok(trigger.matches(event))) {
            Ok(true) => {}
            Ok(false) => {
                trace!(trigger = trigger.name(), "predicate rejected event");
                return;
            }
            Err(message) => {
                let err = RuntimeError::handler_fault(
                    trigger.name(),
                    format!("match predicate: {message}"),
                );
                self.faults.report(&err, &context());
                return;
            }
        }

        self.observe(trigger, event, |observer| observer.before(trigger, event));
        let started = Instant::now();
        let error = trigger.execute(event, &self.interpreter).err();
        let elapsed = started.elapsed();
        self.observe(trigger, event, |observer| {
            observer.after(trigger, event, elapsed, error.as_ref());
        });

        if let Some(err) = error {
            self.faults.report(&err, &context());
        }
    }

    fn observe(
        &self,
        trigger: &Trigger,
        event: &EventRef,
        call: impl FnOnce(&dyn TriggerObserver),
    ) {
        let result = guarded(|| {
            call(self.observer.as_ref());
            Ok(())
        });
        if let Err(message) = result {
            self.faults.report(
                &RuntimeError::ObserverFault { message },
                &FaultContext::new(FaultOrigin::Observer, trigger.name())
                    .with_event(event.event_type()),
            );
        }
    }
}

impl Drop for DispatchInner {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        for (_, bucket) in registry.buckets.drain() {
            self.bus.unsubscribe(&bucket.subscription);
        }
        for (_, entry) in registry.triggers.drain() {
            entry.active.store(false, Ordering::Release);
        }
    }
}

impl Registry {
    fn remove(&mut self, bus: &EventBus, id: TriggerId) -> bool {
        let Some(entry) = self.triggers.remove(&id) else {
            return false;
        };
        entry.active.store(false, Ordering::Release);

        let trigger = &entry.trigger;
        for event_type in trigger.event_types() {
            let key = BucketKey {
                event_type: *event_type,
                priority: trigger.priority(),
            };
            let emptied = match self.buckets.get_mut(&key) {
                Some(bucket) => {
                    let kept: Vec<_> = bucket
                        .triggers
                        .iter()
                        .filter(|r| r.trigger.id() != id)
                        .cloned()
                        .collect();
                    bucket.triggers = Arc::new(kept);
                    bucket.triggers.is_empty()
                }
                None => false,
            };
            if emptied {
                if let Some(bucket) = self.buckets.remove(&key) {
                    bus.unsubscribe(&bucket.subscription);
                    debug!(event_type = %key.event_type, priority = %key.priority, "bucket removed");
                }
            }
        }
        debug!(trigger = trigger.name(), id = %id, "unregistered");
        true
    }
}

/// Registry of compiled triggers, dispatching through an [`EventBus`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatchInner>,
}

impl Dispatcher {
    /// Creates a dispatcher on `bus` using the host's reporter, primary
    /// thread and observer.
    #[must_use]
    pub fn new(bus: EventBus, host: &Host, interpreter: Interpreter) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                bus,
                registry: RwLock::new(Registry::default()),
                seq: AtomicU64::new(0),
                faults: Arc::clone(&host.faults),
                primary: Arc::clone(&host.primary),
                observer: Arc::clone(&host.observer),
                interpreter,
            }),
        }
    }

    /// Registers `trigger` under each of its event types.
    ///
    /// The first trigger in an (event type, priority) bucket installs that
    /// bucket's bus subscription.
    pub fn register(&self, trigger: Trigger) -> TriggerId {
        let id = trigger.id();
        let entry = Arc::new(Registered {
            trigger: Arc::new(trigger),
            active: AtomicBool::new(true),
            seq: self.inner.seq.fetch_add(1, Ordering::Relaxed),
        });
        let priority = entry.trigger.priority();

        let mut registry = self.inner.registry.write();
        for event_type in entry.trigger.event_types() {
            let key = BucketKey {
                event_type: *event_type,
                priority,
            };
            if let Some(bucket) = registry.buckets.get_mut(&key) {
                let mut next = Vec::with_capacity(bucket.triggers.len() + 1);
                next.extend(bucket.triggers.iter().cloned());
                next.push(Arc::clone(&entry));
                bucket.triggers = Arc::new(next);
                continue;
            }

            let fan_out = FanOut {
                dispatcher: Arc::downgrade(&self.inner),
                key,
            };
            let subscription = self.inner.bus.subscribe_with(
                key.event_type,
                SubscribeOptions::new()
                    .priority(priority)
                    .ignore_cancelled(false),
                Arc::new(fan_out),
            );
            debug!(event_type = %key.event_type, priority = %priority, "bucket created");
            registry.buckets.insert(
                key,
                Bucket {
                    triggers: Arc::new(vec![Arc::clone(&entry)]),
                    subscription,
                },
            );
        }
        debug!(
            trigger = entry.trigger.name(),
            id = %id,
            owner = %entry.trigger.owner(),
            priority = %priority,
            "registered"
        );
        registry.triggers.insert(id, entry);
        id
    }

    /// Removes a trigger. Returns `false` if it was not registered.
    ///
    /// An in-flight dispatch that has not reached the trigger yet skips
    /// it.
    pub fn unregister(&self, id: TriggerId) -> bool {
        self.inner.registry.write().remove(&self.inner.bus, id)
    }

    /// Removes every trigger owned by `owner`; returns the count.
    pub fn unregister_owner(&self, owner: &OwnerId) -> usize {
        let mut registry = self.inner.registry.write();
        let ids: Vec<_> = registry
            .triggers
            .values()
            .filter(|r| r.trigger.owner() == owner)
            .map(|r| r.trigger.id())
            .collect();
        ids.into_iter()
            .filter(|id| registry.remove(&self.inner.bus, *id))
            .count()
    }

    /// Returns the registered trigger with this id.
    #[must_use]
    pub fn get(&self, id: TriggerId) -> Option<Arc<Trigger>> {
        self.inner
            .registry
            .read()
            .triggers
            .get(&id)
            .map(|r| Arc::clone(&r.trigger))
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: TriggerId) -> bool {
        self.inner.registry.read().triggers.contains_key(&id)
    }

    /// Number of registered triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.registry.read().triggers.len()
    }

    /// Returns `true` if no triggers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Triggers bound directly to `event_type`, in dispatch order.
    #[must_use]
    pub fn triggers_for(&self, event_type: EventType) -> Vec<Arc<Trigger>> {
        let registry = self.inner.registry.read();
        let mut entries: Vec<_> = registry
            .buckets
            .iter()
            .filter(|(key, _)| key.event_type == event_type)
            .flat_map(|(_, bucket)| bucket.triggers.iter().cloned())
            .collect();
        entries.sort_by_key(|r| (r.trigger.priority(), r.seq));
        entries.into_iter().map(|r| Arc::clone(&r.trigger)).collect()
    }

    /// Number of bus subscriptions the dispatcher holds.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.inner.registry.read().buckets.len()
    }

    /// Returns the interpreter used for trigger bodies.
    #[must_use]
    pub fn interpreter(&self) -> Interpreter {
        self.inner.interpreter
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("triggers", &self.len())
            .field("buckets", &self.bucket_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Statement;
    use crate::host::{CollectingFaultReporter, PrimaryExecutor};
    use crate::testing::test_event_types::{CHAT, ENTITY, JOIN, PLAYER, TICK};
    use crate::testing::{cancellable_event, plain_event, Recorder};
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    struct Fixture {
        bus: EventBus,
        dispatcher: Dispatcher,
        faults: CollectingFaultReporter,
    }

    fn fixture_with(host: impl FnOnce(Host) -> Host) -> Fixture {
        let faults = CollectingFaultReporter::new();
        let host = host(Host {
            faults: Arc::new(faults.clone()),
            ..Host::default()
        });
        let bus = EventBus::new(Arc::clone(&host.faults));
        let dispatcher = Dispatcher::new(bus.clone(), &host, Interpreter::default());
        Fixture {
            bus,
            dispatcher,
            faults,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|host| host)
    }

    fn recording(rec: &Recorder, name: &str, ty: EventType, priority: Priority) -> Trigger {
        Trigger::builder(name)
            .on(ty)
            .priority(priority)
            .affinity(ThreadAffinity::Any)
            .body(vec![rec.effect(name)])
            .build()
            .unwrap()
    }

    // ── Registration ─────────────────────────────────────────

    #[test]
    fn one_bus_subscription_per_bucket() {
        let fx = fixture();
        let rec = Recorder::new();
        fx.dispatcher.register(recording(&rec, "a", JOIN, Priority::Normal));
        fx.dispatcher.register(recording(&rec, "b", JOIN, Priority::Normal));
        fx.dispatcher.register(recording(&rec, "c", JOIN, Priority::High));

        assert_eq!(fx.dispatcher.len(), 3);
        assert_eq!(fx.dispatcher.bucket_count(), 2);
        assert_eq!(fx.bus.subscriber_count(), 2);
    }

    #[test]
    fn unregister_drops_empty_bucket() {
        let fx = fixture();
        let rec = Recorder::new();
        let a = fx.dispatcher.register(recording(&rec, "a", JOIN, Priority::Normal));
        let b = fx.dispatcher.register(recording(&rec, "b", JOIN, Priority::Normal));

        assert!(fx.dispatcher.unregister(a));
        assert_eq!(fx.bus.subscriber_count(), 1);
        assert!(fx.dispatcher.unregister(b));
        assert_eq!(fx.bus.subscriber_count(), 0);
        assert!(!fx.dispatcher.unregister(b));
        assert!(fx.dispatcher.is_empty());
    }

    #[test]
    fn unregister_owner_removes_only_that_owner() {
        let fx = fixture();
        let script = OwnerId::named("scripts/a.rx");
        let mine = Trigger::builder("mine")
            .owner(script.clone())
            .on(JOIN)
            .on(CHAT)
            .build()
            .unwrap();
        let theirs = Trigger::builder("theirs").on(JOIN).build().unwrap();
        fx.dispatcher.register(mine);
        let kept = fx.dispatcher.register(theirs);

        assert_eq!(fx.dispatcher.unregister_owner(&script), 1);
        assert_eq!(fx.dispatcher.len(), 1);
        assert!(fx.dispatcher.contains(kept));
        assert_eq!(fx.bus.subscriber_count(), 1);
    }

    #[test]
    fn triggers_for_lists_in_dispatch_order() {
        let fx = fixture();
        let rec = Recorder::new();
        fx.dispatcher.register(recording(&rec, "late", JOIN, Priority::High));
        fx.dispatcher.register(recording(&rec, "first", JOIN, Priority::Low));
        fx.dispatcher.register(recording(&rec, "second", JOIN, Priority::Low));
        fx.dispatcher.register(recording(&rec, "other", CHAT, Priority::Low));

        let names: Vec<_> = fx
            .dispatcher
            .triggers_for(JOIN)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second", "late"]);
    }

    // ── Dispatch ─────────────────────────────────────────────

    #[test]
    fn supertype_binding_receives_subtype() {
        let fx = fixture();
        let rec = Recorder::new();
        fx.dispatcher.register(recording(&rec, "entity", ENTITY, Priority::Normal));
        fx.dispatcher.register(recording(&rec, "join", JOIN, Priority::Normal));

        fx.bus.publish(&plain_event(JOIN));
        fx.bus.publish(&plain_event(TICK));

        assert_eq!(rec.entries(), vec!["entity", "join"]);
    }

    #[test]
    fn tiers_run_in_priority_order() {
        let fx = fixture();
        let rec = Recorder::new();
        fx.dispatcher.register(recording(&rec, "monitor", JOIN, Priority::Monitor));
        fx.dispatcher.register(recording(&rec, "low", PLAYER, Priority::Low));
        fx.dispatcher.register(recording(&rec, "normal-1", JOIN, Priority::Normal));
        fx.dispatcher.register(recording(&rec, "normal-2", JOIN, Priority::Normal));

        fx.bus.publish(&plain_event(JOIN));

        assert_eq!(rec.entries(), vec!["low", "normal-1", "normal-2", "monitor"]);
    }

    #[test]
    fn predicate_filters_instances() {
        let fx = fixture();
        let rec = Recorder::new();
        let trigger = Trigger::builder("joins-only")
            .on(PLAYER)
            .affinity(ThreadAffinity::Any)
            .matching(|event| event.event_type() == JOIN)
            .body(vec![rec.effect("ran")])
            .build()
            .unwrap();
        fx.dispatcher.register(trigger);

        fx.bus.publish(&plain_event(CHAT));
        assert!(rec.is_empty());
        fx.bus.publish(&plain_event(JOIN));
        assert_eq!(rec.entries(), vec!["ran"]);
    }

    #[test]
    fn multi_bound_trigger_runs_once() {
        let fx = fixture();
        let rec = Recorder::new();
        let trigger = Trigger::builder("both")
            .on(ENTITY)
            .on(JOIN)
            .affinity(ThreadAffinity::Any)
            .body(vec![rec.effect("both")])
            .build()
            .unwrap();
        fx.dispatcher.register(trigger);

        fx.bus.publish(&plain_event(JOIN));
        fx.bus.publish(&plain_event(CHAT));

        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn cancelled_event_skips_later_triggers() {
        let fx = fixture();
        let rec = Recorder::new();
        let canceller = Trigger::builder("cancel")
            .on(CHAT)
            .priority(Priority::Low)
            .affinity(ThreadAffinity::Any)
            .body(vec![Statement::effect(|ctx| {
                ctx.event().set_cancelled(true)?;
                Ok(())
            })])
            .build()
            .unwrap();
        fx.dispatcher.register(canceller);
        fx.dispatcher.register(recording(&rec, "late", CHAT, Priority::High));

        assert!(fx.bus.publish(&cancellable_event(CHAT)));
        assert!(rec.is_empty());
    }

    #[test]
    fn bus_subscriber_can_still_see_cancelled_event() {
        let fx = fixture();
        let rec = Recorder::new();
        let event = cancellable_event(CHAT);
        event.set_cancelled(true).unwrap();

        fx.dispatcher.register(recording(&rec, "trigger", CHAT, Priority::Normal));
        fx.bus
            .subscribe(CHAT, Priority::Normal, false, rec.handler("bus"));

        fx.bus.publish(&event);
        assert_eq!(rec.entries(), vec!["bus"]);
    }

    #[test]
    fn unregister_mid_dispatch_is_honored() {
        let fx = fixture();
        let rec = Recorder::new();
        let victim = recording(&rec, "victim", JOIN, Priority::Normal);
        let victim_id = victim.id();

        let dispatcher = fx.dispatcher.clone();
        let killer = Trigger::builder("killer")
            .on(JOIN)
            .affinity(ThreadAffinity::Any)
            .body(vec![Statement::effect(move |_| {
                dispatcher.unregister(victim_id);
                Ok(())
            })])
            .build()
            .unwrap();
        fx.dispatcher.register(killer);
        fx.dispatcher.register(victim);

        fx.bus.publish(&plain_event(JOIN));
        assert!(rec.is_empty());
    }

    #[test]
    fn failing_body_is_reported_and_dispatch_continues() {
        let fx = fixture();
        let rec = Recorder::new();
        let broken = Trigger::builder("broken")
            .on(JOIN)
            .affinity(ThreadAffinity::Any)
            .body(vec![Statement::effect(|_| anyhow::bail!("no world"))])
            .build()
            .unwrap();
        fx.dispatcher.register(broken);
        fx.dispatcher.register(recording(&rec, "after", JOIN, Priority::Normal));

        fx.bus.publish(&plain_event(JOIN));

        assert_eq!(rec.entries(), vec!["after"]);
        let faults = fx.faults.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].context.origin, FaultOrigin::Trigger);
        assert_eq!(faults[0].context.label, "broken");
        assert_eq!(faults[0].context.event_type, Some(JOIN));
    }

    #[test]
    fn panicking_predicate_is_reported() {
        let fx = fixture();
        let trigger = Trigger::builder("picky")
            .on(JOIN)
            .affinity(ThreadAffinity::Any)
            .matching(|_| panic!("bad predicate"))
            .build()
            .unwrap();
        fx.dispatcher.register(trigger);

        fx.bus.publish(&plain_event(JOIN));
        assert_eq!(fx.faults.codes(), vec!["RUNTIME_HANDLER_FAULT"]);
    }

    // ── Observers ────────────────────────────────────────────

    #[derive(Default)]
    struct CountingObserver {
        calls: Mutex<Vec<String>>,
    }

    impl TriggerObserver for CountingObserver {
        fn before(&self, trigger: &Trigger, _event: &EventRef) {
            self.calls.lock().push(format!("before:{}", trigger.name()));
        }

        fn after(
            &self,
            trigger: &Trigger,
            _event: &EventRef,
            _elapsed: Duration,
            error: Option<&RuntimeError>,
        ) {
            self.calls
                .lock()
                .push(format!("after:{}:{}", trigger.name(), error.is_some()));
        }
    }

    struct PanickingObserver;

    impl TriggerObserver for PanickingObserver {
        fn before(&self, _trigger: &Trigger, _event: &EventRef) {
            panic!("observer bug");
        }
    }

    #[test]
    fn observer_brackets_each_body() {
        let observer = Arc::new(CountingObserver::default());
        let shared = Arc::clone(&observer);
        let fx = fixture_with(move |host| Host {
            observer: shared,
            ..host
        });
        let ok = Trigger::builder("ok")
            .on(TICK)
            .affinity(ThreadAffinity::Any)
            .build()
            .unwrap();
        let bad = Trigger::builder("bad")
            .on(TICK)
            .affinity(ThreadAffinity::Any)
            .body(vec![Statement::effect(|_| anyhow::bail!("nope"))])
            .build()
            .unwrap();
        fx.dispatcher.register(ok);
        fx.dispatcher.register(bad);

        fx.bus.publish(&plain_event(TICK));

        assert_eq!(
            *observer.calls.lock(),
            vec!["before:ok", "after:ok:false", "before:bad", "after:bad:true"]
        );
    }

    #[test]
    fn panicking_observer_does_not_alter_dispatch() {
        let fx = fixture_with(|host| Host {
            observer: Arc::new(PanickingObserver),
            ..host
        });
        let rec = Recorder::new();
        fx.dispatcher.register(recording(&rec, "body", TICK, Priority::Normal));

        fx.bus.publish(&plain_event(TICK));

        assert_eq!(rec.entries(), vec!["body"]);
        assert_eq!(fx.faults.codes(), vec!["RUNTIME_OBSERVER_FAULT"]);
    }

    // ── Thread affinity ──────────────────────────────────────

    #[test]
    fn primary_trigger_is_marshalled_from_worker() {
        let (executor, mut pump) = PrimaryExecutor::for_current_thread();
        let primary_id = thread::current().id();
        let fx = fixture_with(move |host| Host {
            primary: Arc::new(executor),
            ..host
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let seen = Arc::clone(&seen);
            Statement::effect(move |_| {
                seen.lock().push((name, thread::current().id()));
                Ok(())
            })
        };
        let primary_only = Trigger::builder("primary")
            .on(TICK)
            .body(vec![record("primary")])
            .build()
            .unwrap();
        let anywhere = Trigger::builder("anywhere")
            .on(TICK)
            .affinity(ThreadAffinity::Any)
            .body(vec![record("anywhere")])
            .build()
            .unwrap();
        fx.dispatcher.register(primary_only);
        fx.dispatcher.register(anywhere);

        let bus = fx.bus.clone();
        let worker = thread::spawn(move || {
            bus.publish(&plain_event(TICK));
            thread::current().id()
        });
        while !worker.is_finished() {
            pump.run_pending();
            thread::yield_now();
        }
        let worker_id = worker.join().unwrap();

        let seen = seen.lock().clone();
        assert_eq!(seen, vec![("primary", primary_id), ("anywhere", worker_id)]);
        assert!(fx.faults.is_empty());
    }

    struct BrokenPrimary;

    impl PrimaryThread for BrokenPrimary {
        fn is_primary(&self) -> bool {
            false
        }

        fn run_on_primary(
            &self,
            _label: &str,
            _job: crate::host::PrimaryJob,
        ) -> Result<(), RuntimeError> {
            panic!("primary loop torn down")
        }
    }

    #[test]
    fn failed_hand_off_does_not_skip_siblings() {
        let fx = fixture_with(|host| Host {
            primary: Arc::new(BrokenPrimary),
            ..host
        });
        let rec = Recorder::new();
        let primary_only = Trigger::builder("needs-primary")
            .on(TICK)
            .body(vec![rec.effect("needs-primary")])
            .build()
            .unwrap();
        fx.dispatcher.register(primary_only);
        fx.dispatcher
            .register(recording(&rec, "sibling", TICK, Priority::Normal));

        fx.bus.publish(&plain_event(TICK));

        assert_eq!(rec.entries(), vec!["sibling"]);
        let faults = fx.faults.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].context.origin, FaultOrigin::Trigger);
        assert_eq!(faults[0].context.label, "needs-primary");
        assert_eq!(faults[0].context.event_type, Some(TICK));
        assert_eq!(
            faults[0].error,
            RuntimeError::handler_fault("needs-primary", "panicked: primary loop torn down")
        );
    }

    #[test]
    fn publisher_inside_tokio_runtime_can_marshal() {
        let (executor, mut pump) = PrimaryExecutor::for_current_thread();
        let fx = fixture_with(move |host| Host {
            primary: Arc::new(executor),
            ..host
        });
        let rec = Recorder::new();
        let primary_only = Trigger::builder("primary")
            .on(TICK)
            .body(vec![rec.effect("primary")])
            .build()
            .unwrap();
        fx.dispatcher.register(primary_only);
        fx.dispatcher
            .register(recording(&rec, "sibling", TICK, Priority::Normal));

        let bus = fx.bus.clone();
        let worker = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async { bus.publish(&plain_event(TICK)) })
        });
        while !worker.is_finished() {
            pump.run_pending();
            thread::yield_now();
        }
        worker.join().unwrap();

        assert_eq!(rec.entries(), vec!["primary", "sibling"]);
        assert!(fx.faults.is_empty());
    }

    #[test]
    fn dropping_dispatcher_releases_bus_subscriptions() {
        let fx = fixture();
        let rec = Recorder::new();
        fx.dispatcher
            .register(recording(&rec, "a", JOIN, Priority::Normal));
        fx.dispatcher
            .register(recording(&rec, "b", CHAT, Priority::High));
        assert_eq!(fx.bus.subscriber_count(), 2);

        let Fixture { bus, dispatcher, .. } = fx;
        let clone = dispatcher.clone();
        drop(dispatcher);
        assert_eq!(bus.subscriber_count(), 2, "a clone still holds the registry");
        drop(clone);

        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(&plain_event(JOIN));
        assert!(rec.is_empty());
    }

    #[test]
    fn missing_primary_is_reported() {
        let (executor, pump) = PrimaryExecutor::for_current_thread();
        drop(pump);
        let fx = fixture_with(move |host| Host {
            primary: Arc::new(executor),
            ..host
        });
        let trigger = Trigger::builder("stuck").on(TICK).build().unwrap();
        fx.dispatcher.register(trigger);

        let bus = fx.bus.clone();
        thread::spawn(move || bus.publish(&plain_event(TICK)))
            .join()
            .unwrap();

        assert_eq!(fx.faults.codes(), vec!["RUNTIME_PRIMARY_UNAVAILABLE"]);
    }
}
