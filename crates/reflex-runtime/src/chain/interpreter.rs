//! Walks a [`Chain`] for one event.

use super::program::{Chain, Node, NodeId};
use super::statement::SectionKind;
use crate::error::{guarded, RuntimeError};
use reflex_event::EventRef;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-invocation state handed to every effect and condition.
///
/// Created when a trigger body starts and dropped when it ends, so loop
/// counters never leak between events or between concurrent runs of the
/// same chain.
pub struct ExecutionContext {
    chain: Arc<Chain>,
    event: EventRef,
    trigger: String,
    current: Option<NodeId>,
    loop_counters: HashMap<NodeId, u64>,
    entered: HashSet<NodeId>,
    steps: u64,
}

impl ExecutionContext {
    fn new(chain: Arc<Chain>, event: EventRef, trigger: &str) -> Self {
        Self {
            chain,
            event,
            trigger: trigger.to_string(),
            current: None,
            loop_counters: HashMap::new(),
            entered: HashSet::new(),
            steps: 0,
        }
    }

    /// The event being handled.
    #[must_use]
    pub fn event(&self) -> &EventRef {
        &self.event
    }

    /// Name of the trigger whose body is running.
    #[must_use]
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// The node being executed.
    #[must_use]
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// Steps taken so far, including the current one.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Counter of the innermost loop enclosing the current node.
    ///
    /// Returns 1 outside any loop or before the loop has state.
    #[must_use]
    pub fn loop_counter(&self) -> u64 {
        self.current
            .and_then(|id| self.chain.enclosing_loop(id))
            .map_or(1, |section| self.loop_counter_of(section))
    }

    /// Counter of a specific loop section; 1 if it has no state.
    #[must_use]
    pub fn loop_counter_of(&self, section: NodeId) -> u64 {
        self.loop_counters.get(&section).copied().unwrap_or(1)
    }

    fn advance_loop(&mut self, section: NodeId) -> u64 {
        let counter = self
            .loop_counters
            .entry(section)
            .and_modify(|c| *c += 1)
            .or_insert(1);
        *counter
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("trigger", &self.trigger)
            .field("event_type", &self.event.event_type())
            .field("current", &self.current)
            .field("loop_counters", &self.loop_counters)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// What to do when a body runs off its end.
#[derive(Debug, Clone, Copy)]
enum Resume {
    /// Continue at a gate's `next` (or keep unwinding if `None`).
    At(Option<NodeId>),
    /// Return control to a section so it can re-enter or exit.
    Section(NodeId),
}

/// Result of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Interpreter steps taken.
    pub steps: u64,
}

/// Executes chains.
///
/// ```text
/// cursor = entry
/// loop:
///   cursor = None → pop continuation stack (empty → done)
///   effect        → run, cursor = next
///   gate          → true: push Resume(next), cursor = action
///                   false: cursor = next
///   loop section  → counter = 1 on entry, +1 on return
///                   iterate: push Section(self), cursor = body
///                   else: clear counter, cursor = next
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter {
    max_steps: Option<u64>,
}

impl Interpreter {
    /// Creates an interpreter with an optional step limit.
    #[must_use]
    pub fn new(max_steps: Option<u64>) -> Self {
        Self { max_steps }
    }

    /// Runs `chain` for `event` on the calling thread.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::HandlerFault`] if a step fails or panics; the
    ///   rest of the chain is skipped.
    /// - [`RuntimeError::StepLimitExceeded`] if the limit is hit.
    pub fn run(
        &self,
        chain: &Arc<Chain>,
        event: &EventRef,
        trigger: &str,
    ) -> Result<RunSummary, RuntimeError> {
        let mut ctx = ExecutionContext::new(Arc::clone(chain), event.clone(), trigger);
        let mut stack: Vec<Resume> = Vec::new();
        let mut cursor = chain.entry();

        loop {
            let Some(id) = cursor.or_else(|| unwind(&mut stack)) else {
                break;
            };

            ctx.steps += 1;
            if let Some(limit) = self.max_steps {
                if ctx.steps > limit {
                    debug!(trigger, limit, "step limit reached, aborting body");
                    return Err(RuntimeError::StepLimitExceeded {
                        trigger: trigger.to_string(),
                        limit,
                    });
                }
            }

            ctx.current = Some(id);
            cursor = step(chain.node(id), id, &mut ctx, &mut stack)?;
        }

        trace!(trigger, steps = ctx.steps, "chain finished");
        Ok(RunSummary { steps: ctx.steps })
    }
}

fn unwind(stack: &mut Vec<Resume>) -> Option<NodeId> {
    while let Some(resume) = stack.pop() {
        match resume {
            Resume::At(Some(id)) | Resume::Section(id) => return Some(id),
            Resume::At(None) => {}
        }
    }
    None
}

/// Runs one user callback, mapping failure to a fault naming the step.
fn call<T>(
    ctx: &ExecutionContext,
    node: &Node,
    id: NodeId,
    f: impl FnOnce(&ExecutionContext) -> anyhow::Result<T>,
) -> Result<T, RuntimeError> {
    guarded(|| f(ctx)).map_err(|message| {
        RuntimeError::handler_fault(
            ctx.trigger.as_str(),
            format!("{} {id}: {message}", node.kind_name()),
        )
    })
}

fn step(
    node: &Node,
    id: NodeId,
    ctx: &mut ExecutionContext,
    stack: &mut Vec<Resume>,
) -> Result<Option<NodeId>, RuntimeError> {
    match node {
        Node::Effect { action, next, .. } => {
            call(ctx, node, id, |c| action.execute(c))?;
            Ok(*next)
        }
        Node::Action { action, .. } => {
            call(ctx, node, id, |c| action.execute(c))?;
            Ok(None)
        }
        Node::Gated {
            condition,
            action,
            next,
            ..
        } => {
            if call(ctx, node, id, |c| condition.check(c))? {
                stack.push(Resume::At(*next));
                Ok(Some(*action))
            } else {
                Ok(*next)
            }
        }
        Node::Section {
            kind: SectionKind::Loop(control),
            body,
            next,
            ..
        } => {
            let iteration = ctx.advance_loop(id);
            let again = body.is_some()
                && call(ctx, node, id, |c| control.should_iterate(c, iteration))?;
            if again {
                stack.push(Resume::Section(id));
                Ok(*body)
            } else {
                ctx.loop_counters.remove(&id);
                Ok(*next)
            }
        }
        Node::Section {
            kind: SectionKind::Conditional(condition),
            body,
            next,
            ..
        } => {
            if ctx.entered.remove(&id) {
                return Ok(*next);
            }
            let enter = body.is_some() && call(ctx, node, id, |c| condition.check(c))?;
            if enter {
                ctx.entered.insert(id);
                stack.push(Resume::Section(id));
                Ok(*body)
            } else {
                Ok(*next)
            }
        }
    }
}
