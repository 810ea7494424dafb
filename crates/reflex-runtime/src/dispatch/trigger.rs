//! Compiled triggers.

use crate::chain::{Chain, Interpreter, RunSummary, Statement};
use crate::error::RuntimeError;
use reflex_event::{EventRef, EventType};
use reflex_types::{OwnerId, Priority, TriggerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a trigger body may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadAffinity {
    /// Only on the primary thread; marshalled there when published
    /// elsewhere.
    #[default]
    Primary,
    /// On whichever thread dispatches the event.
    Any,
}

type Matcher = Arc<dyn Fn(&EventRef) -> bool + Send + Sync>;

/// A condition + action chain bound to one or more event types.
///
/// Built with [`Trigger::builder`] and handed to
/// [`Dispatcher::register`](super::Dispatcher::register).
///
/// # Example
///
/// ```
/// use reflex_event::EventType;
/// use reflex_runtime::chain::Statement;
/// use reflex_runtime::dispatch::{ThreadAffinity, Trigger};
/// use reflex_types::{OwnerId, Priority};
///
/// static CHAT: EventType = EventType::root("chat");
///
/// let trigger = Trigger::builder("censor")
///     .owner(OwnerId::named("scripts/censor.rx"))
///     .on(CHAT)
///     .priority(Priority::High)
///     .affinity(ThreadAffinity::Any)
///     .matching(|event| !event.is_cancelled())
///     .body(vec![Statement::effect(|ctx| Ok(ctx.event().set_cancelled(true)?))])
///     .build()
///     .expect("valid trigger");
///
/// assert!(trigger.can_execute_asynchronously());
/// assert_eq!(trigger.event_types(), &[CHAT]);
/// ```
pub struct Trigger {
    id: TriggerId,
    name: String,
    owner: OwnerId,
    event_types: Vec<EventType>,
    priority: Priority,
    affinity: ThreadAffinity,
    matcher: Option<Matcher>,
    chain: Arc<Chain>,
}

impl Trigger {
    /// Starts building a trigger named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TriggerBuilder {
        TriggerBuilder::new(name)
    }

    /// Returns the id.
    #[must_use]
    pub fn id(&self) -> TriggerId {
        self.id
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owner.
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns the bound event types.
    #[must_use]
    pub fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    /// Returns the tier.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the thread affinity.
    #[must_use]
    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    /// Returns `true` if the body may run off the primary thread.
    #[must_use]
    pub fn can_execute_asynchronously(&self) -> bool {
        self.affinity == ThreadAffinity::Any
    }

    /// Returns the compiled body.
    #[must_use]
    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    /// Evaluates the match predicate; `true` when none is set.
    #[must_use]
    pub fn matches(&self, event: &EventRef) -> bool {
        self.matcher.as_ref().map_or(true, |m| m(event))
    }

    /// The most specific bound type that receives `event_type`.
    ///
    /// A trigger bound to several matching types runs once per event,
    /// from this binding.
    #[must_use]
    pub fn binding_for(&self, event_type: EventType) -> Option<EventType> {
        self.event_types
            .iter()
            .filter_map(|bound| bound.distance_from(&event_type).map(|d| (d, *bound)))
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, bound)| bound)
    }

    /// Runs the body for `event` on the calling thread.
    ///
    /// # Errors
    ///
    /// Whatever the interpreter reports.
    pub fn execute(
        &self,
        event: &EventRef,
        interpreter: &Interpreter,
    ) -> Result<RunSummary, RuntimeError> {
        interpreter.run(&self.chain, event, &self.name)
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("event_types", &self.event_types)
            .field("priority", &self.priority)
            .field("affinity", &self.affinity)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Trigger`].
///
/// Defaults: host owner, [`Priority::Normal`], [`ThreadAffinity::Primary`],
/// no match predicate, empty body.
pub struct TriggerBuilder {
    name: String,
    owner: OwnerId,
    event_types: Vec<EventType>,
    priority: Priority,
    affinity: ThreadAffinity,
    matcher: Option<Matcher>,
    chain: Option<Arc<Chain>>,
}

impl TriggerBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: OwnerId::host(),
            event_types: Vec::new(),
            priority: Priority::default(),
            affinity: ThreadAffinity::default(),
            matcher: None,
            chain: None,
        }
    }

    /// Sets the owner.
    #[must_use]
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    /// Binds to an event type. May be called repeatedly.
    #[must_use]
    pub fn on(mut self, event_type: EventType) -> Self {
        if !self.event_types.contains(&event_type) {
            self.event_types.push(event_type);
        }
        self
    }

    /// Sets the tier.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the thread affinity.
    #[must_use]
    pub fn affinity(mut self, affinity: ThreadAffinity) -> Self {
        self.affinity = affinity;
        self
    }

    /// Sets a predicate evaluated against each candidate event.
    #[must_use]
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventRef) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(predicate));
        self
    }

    /// Compiles `statements` as the body.
    #[must_use]
    pub fn body(mut self, statements: Vec<Statement>) -> Self {
        self.chain = Some(Arc::new(Chain::compile(statements)));
        self
    }

    /// Uses an already compiled, possibly shared body.
    #[must_use]
    pub fn chain(mut self, chain: Arc<Chain>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Builds the trigger.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidTrigger`] if the name is blank or no event
    /// type is bound.
    pub fn build(self) -> Result<Trigger, RuntimeError> {
        if self.name.trim().is_empty() {
            return Err(RuntimeError::invalid_trigger(self.name, "name is empty"));
        }
        if self.event_types.is_empty() {
            return Err(RuntimeError::invalid_trigger(
                self.name,
                "no event types bound",
            ));
        }
        Ok(Trigger {
            id: TriggerId::new(),
            name: self.name,
            owner: self.owner,
            event_types: self.event_types,
            priority: self.priority,
            affinity: self.affinity,
            matcher: self.matcher,
            chain: self.chain.unwrap_or_else(|| Arc::new(Chain::empty())),
        })
    }
}
