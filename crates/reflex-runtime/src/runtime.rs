//! The assembled runtime.

use crate::bus::EventBus;
use crate::chain::Interpreter;
use crate::config::RuntimeConfig;
use crate::dispatch::{Dispatcher, Trigger, TriggerBuilder};
use crate::error::RuntimeError;
use crate::host::{
    call_on_primary, AffinityGuard, FaultReporter, Host, PrimaryThread, ReadinessProbe,
    TriggerObserver,
};
use crate::scheduler::Scheduler;
use reflex_event::EventRef;
use reflex_types::{OwnerId, TaskId, TriggerId};
use std::sync::Arc;
use tracing::info;

/// What [`RuntimeCore::unload_owner`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnloadSummary {
    /// Triggers unregistered.
    pub triggers: usize,
    /// Scheduled tasks cancelled.
    pub tasks: usize,
    /// Bus subscriptions removed.
    pub subscriptions: usize,
}

impl UnloadSummary {
    /// Total items removed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.triggers + self.tasks + self.subscriptions
    }
}

struct CoreInner {
    config: RuntimeConfig,
    host: Host,
    bus: EventBus,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    affinity: AffinityGuard,
}

/// One isolated runtime: a bus, a dispatcher and a scheduler sharing a
/// set of host collaborators.
///
/// Cheap to clone. Several instances may live in one process without
/// sharing any state.
///
/// # Example
///
/// ```
/// use reflex_event::{EventRef, EventType, GenericEvent};
/// use reflex_runtime::chain::Statement;
/// use reflex_runtime::dispatch::ThreadAffinity;
/// use reflex_runtime::RuntimeCore;
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
///
/// static PING: EventType = EventType::root("ping");
///
/// let core = RuntimeCore::builder().build()?;
/// let hits = Arc::new(AtomicU64::new(0));
/// let counter = Arc::clone(&hits);
///
/// let trigger = core
///     .trigger("count pings")
///     .on(PING)
///     .affinity(ThreadAffinity::Any)
///     .body(vec![Statement::effect(move |_| {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     })])
///     .build()?;
/// core.register_trigger(trigger);
///
/// core.publish(&EventRef::new(GenericEvent::new(PING, serde_json::Value::Null)));
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// core.shutdown();
/// # Ok::<(), reflex_runtime::RuntimeError>(())
/// ```
#[derive(Clone)]
pub struct RuntimeCore {
    inner: Arc<CoreInner>,
}

impl RuntimeCore {
    /// Starts building a runtime.
    #[must_use]
    pub fn builder() -> RuntimeCoreBuilder {
        RuntimeCoreBuilder::default()
    }

    // ── Events ───────────────────────────────────────────────

    /// Publishes `event` and returns its final cancelled state.
    ///
    /// Blocks while primary-only triggers are marshalled.
    pub fn publish(&self, event: &EventRef) -> bool {
        self.inner.bus.publish(event)
    }

    // ── Triggers ─────────────────────────────────────────────

    /// A trigger builder preset with this runtime's default priority.
    #[must_use]
    pub fn trigger(&self, name: impl Into<String>) -> TriggerBuilder {
        Trigger::builder(name).priority(self.inner.config.default_priority)
    }

    /// Registers a trigger.
    pub fn register_trigger(&self, trigger: Trigger) -> TriggerId {
        self.inner.dispatcher.register(trigger)
    }

    /// Unregisters a trigger. Returns `false` if unknown.
    pub fn unregister_trigger(&self, id: TriggerId) -> bool {
        self.inner.dispatcher.unregister(id)
    }

    // ── Tasks ────────────────────────────────────────────────

    /// Runs `task` once after `delay_ticks`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SchedulerShutdown`] after [`shutdown`](Self::shutdown).
    pub fn schedule_once<F>(
        &self,
        owner: OwnerId,
        delay_ticks: u64,
        task: F,
    ) -> Result<TaskId, RuntimeError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.scheduler.schedule_once(owner, delay_ticks, task)
    }

    /// Runs `task` after `delay_ticks`, then every `period_ticks`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SchedulerShutdown`] after [`shutdown`](Self::shutdown).
    pub fn schedule_repeating<F>(
        &self,
        owner: OwnerId,
        delay_ticks: u64,
        period_ticks: u64,
        task: F,
    ) -> Result<TaskId, RuntimeError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner
            .scheduler
            .schedule_repeating(owner, delay_ticks, period_ticks, task)
    }

    /// Runs `task` on a scheduler worker as soon as the host is ready.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SchedulerShutdown`] after [`shutdown`](Self::shutdown).
    pub fn run_async<F>(&self, owner: OwnerId, task: F) -> Result<TaskId, RuntimeError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.scheduler.run_async(owner, task)
    }

    /// Stops future firings of a task. Returns `false` if not queued.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.inner.scheduler.cancel(id)
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Removes everything `owner` registered: triggers, queued tasks and
    /// bus subscriptions made with that owner.
    pub fn unload_owner(&self, owner: &OwnerId) -> UnloadSummary {
        let summary = UnloadSummary {
            triggers: self.inner.dispatcher.unregister_owner(owner),
            tasks: self.inner.scheduler.cancel_all(owner),
            subscriptions: self.inner.bus.unsubscribe_owner(owner),
        };
        info!(
            owner = %owner,
            triggers = summary.triggers,
            tasks = summary.tasks,
            subscriptions = summary.subscriptions,
            "owner unloaded"
        );
        summary
    }

    /// Stops the scheduler. Events can still be published afterwards.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    /// Checks that the caller is on the primary thread.
    ///
    /// Host facilities that touch primary-only state call this first.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ThreadAffinityViolation`] off the primary thread
    /// when `strict_affinity` is off.
    ///
    /// # Panics
    ///
    /// Off the primary thread when `strict_affinity` is on.
    pub fn ensure_primary(&self, facility: &str) -> Result<(), RuntimeError> {
        self.inner.affinity.ensure_primary(facility)
    }

    /// Computes a value on the primary thread, blocking until it is ready.
    ///
    /// For scheduled tasks that need primary-only state.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::HandlerFault`] if `f` fails or panics.
    /// - [`RuntimeError::PrimaryUnavailable`] if the primary side is gone.
    pub fn call_on_primary<T, F>(&self, label: &str, f: F) -> Result<T, RuntimeError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        call_on_primary(self.inner.host.primary.as_ref(), label, f)
    }

    // ── Accessors ────────────────────────────────────────────

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The trigger dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// The task scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// The configuration the runtime was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The host collaborators.
    #[must_use]
    pub fn host(&self) -> &Host {
        &self.inner.host
    }
}

impl std::fmt::Debug for RuntimeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeCore")
            .field("config", &self.inner.config)
            .field("dispatcher", &self.inner.dispatcher)
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RuntimeCore`].
///
/// Every collaborator defaults to the matching entry of
/// [`Host::default`].
#[derive(Debug, Default)]
pub struct RuntimeCoreBuilder {
    config: RuntimeConfig,
    host: Host,
}

impl RuntimeCoreBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces every host collaborator at once.
    #[must_use]
    pub fn host(mut self, host: Host) -> Self {
        self.host = host;
        self
    }

    /// Sets where caught faults go.
    #[must_use]
    pub fn fault_reporter(mut self, faults: impl FaultReporter + 'static) -> Self {
        self.host.faults = Arc::new(faults);
        self
    }

    /// Sets the readiness gate for scheduled tasks.
    #[must_use]
    pub fn readiness(mut self, readiness: impl ReadinessProbe + 'static) -> Self {
        self.host.readiness = Arc::new(readiness);
        self
    }

    /// Sets the primary-thread executor.
    #[must_use]
    pub fn primary(mut self, primary: impl PrimaryThread + 'static) -> Self {
        self.host.primary = Arc::new(primary);
        self
    }

    /// Sets the trigger observer.
    #[must_use]
    pub fn observer(mut self, observer: impl TriggerObserver + 'static) -> Self {
        self.host.observer = Arc::new(observer);
        self
    }

    /// Validates the configuration and starts the runtime.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Config`] if the configuration is invalid.
    /// - [`RuntimeError::SchedulerStart`] if the timer thread cannot start.
    pub fn build(self) -> Result<RuntimeCore, RuntimeError> {
        let Self { config, host } = self;
        config
            .validate()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;

        let bus = EventBus::new(Arc::clone(&host.faults));
        let interpreter = Interpreter::new(config.max_chain_steps);
        let dispatcher = Dispatcher::new(bus.clone(), &host, interpreter);
        let scheduler = Scheduler::start(&config, &host)?;
        let affinity = AffinityGuard::new(Arc::clone(&host.primary), config.strict_affinity);

        info!(
            tick_ms = config.tick_millis,
            strict_affinity = config.strict_affinity,
            max_chain_steps = ?config.max_chain_steps,
            "runtime ready"
        );

        Ok(RuntimeCore {
            inner: Arc::new(CoreInner {
                config,
                host,
                bus,
                dispatcher,
                scheduler,
                affinity,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SubscribeOptions;
    use crate::host::{CollectingFaultReporter, PrimaryExecutor};
    use crate::testing::test_event_types::{JOIN, TICK};
    use crate::testing::{plain_event, Recorder};
    use reflex_types::Priority;
    use std::thread;

    fn quiet_config() -> RuntimeConfig {
        RuntimeConfig {
            tick_millis: 1,
            readiness_poll_millis: 1,
            strict_affinity: false,
            ..RuntimeConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RuntimeConfig {
            tick_millis: 0,
            ..RuntimeConfig::default()
        };
        let err = RuntimeCore::builder().config(config).build().unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn trigger_builder_uses_configured_priority() {
        let core = RuntimeCore::builder()
            .config(RuntimeConfig {
                default_priority: Priority::High,
                ..quiet_config()
            })
            .build()
            .unwrap();
        let trigger = core.trigger("t").on(TICK).build().unwrap();
        assert_eq!(trigger.priority(), Priority::High);
    }

    #[test]
    fn step_limit_comes_from_config() {
        let faults = CollectingFaultReporter::new();
        let core = RuntimeCore::builder()
            .config(RuntimeConfig {
                max_chain_steps: Some(20),
                ..quiet_config()
            })
            .fault_reporter(faults.clone())
            .build()
            .unwrap();
        let spin = core
            .trigger("spin")
            .on(TICK)
            .body(vec![crate::chain::Statement::while_loop(
                |_| Ok(true),
                vec![crate::chain::Statement::effect(|_| Ok(()))],
            )])
            .build()
            .unwrap();
        core.register_trigger(spin);

        core.publish(&plain_event(TICK));
        assert_eq!(faults.codes(), vec!["RUNTIME_STEP_LIMIT_EXCEEDED"]);
    }

    #[test]
    fn unload_owner_clears_everything_it_owns() {
        let core = RuntimeCore::builder().config(quiet_config()).build().unwrap();
        let script = OwnerId::named("scripts/greeter.rx");
        let rec = Recorder::new();

        let trigger = core
            .trigger("greet")
            .owner(script.clone())
            .on(JOIN)
            .body(vec![rec.effect("trigger")])
            .build()
            .unwrap();
        core.register_trigger(trigger);
        core.schedule_repeating(script.clone(), 10_000, 10, || Ok(()))
            .unwrap();
        core.bus().subscribe_with(
            JOIN,
            SubscribeOptions::new().owner(script.clone()),
            Arc::new(rec.handler("bus")),
        );

        let summary = core.unload_owner(&script);
        assert_eq!(
            summary,
            UnloadSummary {
                triggers: 1,
                tasks: 1,
                subscriptions: 1
            }
        );
        assert_eq!(summary.total(), 3);

        core.publish(&plain_event(JOIN));
        assert!(rec.is_empty());
        assert_eq!(core.scheduler().pending_count(), 0);
    }

    #[test]
    fn instances_are_isolated() {
        let a = RuntimeCore::builder().config(quiet_config()).build().unwrap();
        let b = RuntimeCore::builder().config(quiet_config()).build().unwrap();
        let rec = Recorder::new();
        let trigger = a
            .trigger("only-a")
            .on(TICK)
            .body(vec![rec.effect("a")])
            .build()
            .unwrap();
        a.register_trigger(trigger);

        b.publish(&plain_event(TICK));
        assert!(rec.is_empty());
        a.publish(&plain_event(TICK));
        assert_eq!(rec.entries(), vec!["a"]);
    }

    #[test]
    fn ensure_primary_reports_off_thread_use() {
        let (executor, _pump) = PrimaryExecutor::for_current_thread();
        let core = RuntimeCore::builder()
            .config(quiet_config())
            .primary(executor)
            .build()
            .unwrap();
        assert!(core.ensure_primary("world.set_block").is_ok());

        let remote = core.clone();
        let result = thread::spawn(move || remote.ensure_primary("world.set_block"))
            .join()
            .unwrap();
        assert!(matches!(
            result,
            Err(RuntimeError::ThreadAffinityViolation { .. })
        ));
    }

    #[test]
    fn shutdown_keeps_bus_usable() {
        let core = RuntimeCore::builder().config(quiet_config()).build().unwrap();
        core.shutdown();
        assert_eq!(
            core.schedule_once(OwnerId::host(), 0, || Ok(())),
            Err(RuntimeError::SchedulerShutdown)
        );

        let rec = Recorder::new();
        core.bus()
            .subscribe(TICK, Priority::Normal, true, rec.handler("still here"));
        core.publish(&plain_event(TICK));
        assert_eq!(rec.len(), 1);
    }
}
