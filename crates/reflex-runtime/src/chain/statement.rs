//! Statement descriptors: what a trigger body is built from.

use super::ExecutionContext;
use std::fmt;
use std::sync::Arc;

/// A side effect performed by one step.
pub trait Effect: Send + Sync {
    /// Performs the effect.
    ///
    /// # Errors
    ///
    /// Any error aborts the rest of the chain and is reported.
    fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()>;
}

impl<F> Effect for F
where
    F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// A boolean test evaluated against the current invocation.
pub trait Condition: Send + Sync {
    /// Evaluates the test.
    ///
    /// # Errors
    ///
    /// Any error aborts the rest of the chain and is reported.
    fn check(&self, ctx: &ExecutionContext) -> anyhow::Result<bool>;
}

impl<F> Condition for F
where
    F: Fn(&ExecutionContext) -> anyhow::Result<bool> + Send + Sync,
{
    fn check(&self, ctx: &ExecutionContext) -> anyhow::Result<bool> {
        self(ctx)
    }
}

/// Decides whether a loop section runs its body again.
///
/// `iteration` is the loop counter for the pass about to start: 1 on
/// entry, then incremented before each re-entry.
pub trait LoopControl: Send + Sync {
    /// Returns `true` to run the body for `iteration`.
    ///
    /// # Errors
    ///
    /// Any error aborts the rest of the chain and is reported.
    fn should_iterate(&self, ctx: &ExecutionContext, iteration: u64) -> anyhow::Result<bool>;
}

/// Runs the body a fixed number of times.
#[derive(Debug, Clone, Copy)]
pub struct Repeat(pub u64);

impl LoopControl for Repeat {
    fn should_iterate(&self, _ctx: &ExecutionContext, iteration: u64) -> anyhow::Result<bool> {
        Ok(iteration <= self.0)
    }
}

/// Runs the body while a condition holds.
pub struct While(pub Arc<dyn Condition>);

impl LoopControl for While {
    fn should_iterate(&self, ctx: &ExecutionContext, _iteration: u64) -> anyhow::Result<bool> {
        self.0.check(ctx)
    }
}

/// How a section treats its nested body.
#[derive(Clone)]
pub enum SectionKind {
    /// Re-enter the body while the control allows it.
    Loop(Arc<dyn LoopControl>),
    /// Run the body at most once, if the condition holds.
    Conditional(Arc<dyn Condition>),
}

impl fmt::Debug for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loop(_) => f.write_str("Loop"),
            Self::Conditional(_) => f.write_str("Conditional"),
        }
    }
}

/// One statement of a trigger body, before compilation.
///
/// # Example
///
/// ```
/// use reflex_runtime::chain::{Chain, Statement};
///
/// let chain = Chain::compile(vec![
///     Statement::effect(|_| Ok(())),
///     Statement::repeat(3, vec![Statement::effect(|ctx| {
///         let _pass = ctx.loop_counter();
///         Ok(())
///     })]),
/// ]);
/// assert_eq!(chain.len(), 3);
/// ```
#[derive(Clone)]
pub enum Statement {
    /// A plain side effect.
    Effect(Arc<dyn Effect>),
    /// An effect that runs only when its condition holds.
    Gated {
        /// The guard.
        condition: Arc<dyn Condition>,
        /// The guarded action.
        action: Arc<dyn Effect>,
    },
    /// A nested body with its own re-entry logic.
    Section {
        /// Loop or conditional.
        kind: SectionKind,
        /// The nested statements.
        body: Vec<Statement>,
    },
}

impl Statement {
    /// A plain effect.
    pub fn effect<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Effect(Arc::new(f))
    }

    /// An effect guarded by `condition`.
    pub fn gated<C, F>(condition: C, action: F) -> Self
    where
        C: Fn(&ExecutionContext) -> anyhow::Result<bool> + Send + Sync + 'static,
        F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Gated {
            condition: Arc::new(condition),
            action: Arc::new(action),
        }
    }

    /// A loop running `body` `times` times.
    #[must_use]
    pub fn repeat(times: u64, body: Vec<Statement>) -> Self {
        Self::looping(Repeat(times), body)
    }

    /// A loop running `body` while `condition` holds.
    pub fn while_loop<C>(condition: C, body: Vec<Statement>) -> Self
    where
        C: Fn(&ExecutionContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::looping(While(Arc::new(condition)), body)
    }

    /// A loop with custom control.
    pub fn looping(control: impl LoopControl + 'static, body: Vec<Statement>) -> Self {
        Self::Section {
            kind: SectionKind::Loop(Arc::new(control)),
            body,
        }
    }

    /// A section running `body` once if `condition` holds.
    pub fn conditional<C>(condition: C, body: Vec<Statement>) -> Self
    where
        C: Fn(&ExecutionContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Section {
            kind: SectionKind::Conditional(Arc::new(condition)),
            body,
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Effect(_) => f.write_str("Effect"),
            Self::Gated { .. } => f.write_str("Gated"),
            Self::Section { kind, body } => f
                .debug_struct("Section")
                .field("kind", kind)
                .field("body", body)
                .finish(),
        }
    }
}
