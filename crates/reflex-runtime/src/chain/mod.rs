//! Statement chains: trigger bodies and their interpreter.
//!
//! A body is authored as a tree of [`Statement`]s, compiled once into an
//! immutable [`Chain`], and executed per event by the [`Interpreter`]
//! with a fresh [`ExecutionContext`].
//!
//! # Example
//!
//! ```
//! use reflex_event::{EventRef, EventType, GenericEvent};
//! use reflex_runtime::chain::{Chain, Interpreter, Statement};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! static TICK: EventType = EventType::root("tick");
//!
//! let total = Arc::new(AtomicU64::new(0));
//! let add = {
//!     let total = Arc::clone(&total);
//!     move |ctx: &reflex_runtime::chain::ExecutionContext| {
//!         total.fetch_add(ctx.loop_counter(), Ordering::SeqCst);
//!         Ok(())
//!     }
//! };
//!
//! let chain = Arc::new(Chain::compile(vec![Statement::repeat(
//!     4,
//!     vec![Statement::effect(add)],
//! )]));
//!
//! let event = EventRef::new(GenericEvent::new(TICK, serde_json::Value::Null));
//! Interpreter::default().run(&chain, &event, "sum").expect("runs");
//! assert_eq!(total.load(Ordering::SeqCst), 1 + 2 + 3 + 4);
//! ```

mod interpreter;
mod program;
mod statement;

pub use interpreter::{ExecutionContext, Interpreter, RunSummary};
pub use program::{Chain, NodeId};
pub use statement::{Condition, Effect, LoopControl, Repeat, SectionKind, Statement, While};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::testing::test_event_types::TICK;
    use crate::testing::{plain_event, Recorder};
    use reflex_event::{EventRef, GenericEvent};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn run(statements: Vec<Statement>) -> Result<RunSummary, RuntimeError> {
        let chain = Arc::new(Chain::compile(statements));
        Interpreter::default().run(&chain, &plain_event(TICK), "test")
    }

    fn counter_effect(rec: &Recorder, label: &'static str) -> Statement {
        let rec = rec.clone();
        Statement::effect(move |ctx| {
            rec.record(format!("{label}:{}", ctx.loop_counter()));
            Ok(())
        })
    }

    // ── Effects & gates ──────────────────────────────────────

    #[test]
    fn effects_run_in_order() {
        let rec = Recorder::new();
        run(vec![rec.effect("a"), rec.effect("b"), rec.effect("c")]).unwrap();
        assert_eq!(rec.entries(), vec!["a", "b", "c"]);
    }

    #[test]
    fn false_gate_skips_action_only() {
        let rec = Recorder::new();
        let action = rec.clone();
        run(vec![
            Statement::gated(|_| Ok(false), move |_| {
                action.record("gated");
                Ok(())
            }),
            rec.effect("next"),
        ])
        .unwrap();
        assert_eq!(rec.entries(), vec!["next"]);
    }

    #[test]
    fn true_gate_runs_action_once_then_next() {
        let rec = Recorder::new();
        let action = rec.clone();
        run(vec![
            Statement::gated(|_| Ok(true), move |_| {
                action.record("gated");
                Ok(())
            }),
            rec.effect("next"),
        ])
        .unwrap();
        assert_eq!(rec.entries(), vec!["gated", "next"]);
    }

    #[test]
    fn gate_at_end_of_loop_body_returns_to_loop() {
        let rec = Recorder::new();
        let action = rec.clone();
        run(vec![Statement::repeat(
            2,
            vec![Statement::gated(|ctx| Ok(ctx.loop_counter() == 2), move |_| {
                action.record("second pass");
                Ok(())
            })],
        )])
        .unwrap();
        assert_eq!(rec.entries(), vec!["second pass"]);
    }

    // ── Loops ────────────────────────────────────────────────

    #[test]
    fn loop_counter_counts_then_reverts() {
        let rec = Recorder::new();
        run(vec![
            Statement::repeat(3, vec![counter_effect(&rec, "in")]),
            counter_effect(&rec, "after"),
        ])
        .unwrap();
        assert_eq!(rec.entries(), vec!["in:1", "in:2", "in:3", "after:1"]);
    }

    #[test]
    fn nested_loops_reset_inner_counter() {
        let rec = Recorder::new();
        run(vec![Statement::repeat(
            2,
            vec![Statement::repeat(2, vec![counter_effect(&rec, "inner")])],
        )])
        .unwrap();
        assert_eq!(
            rec.entries(),
            vec!["inner:1", "inner:2", "inner:1", "inner:2"]
        );
    }

    #[test]
    fn zero_repeat_skips_body() {
        let rec = Recorder::new();
        run(vec![Statement::repeat(0, vec![rec.effect("body")]), rec.effect("after")]).unwrap();
        assert_eq!(rec.entries(), vec!["after"]);
    }

    #[test]
    fn while_loop_uses_condition() {
        let remaining = Arc::new(AtomicU64::new(3));
        let check = Arc::clone(&remaining);
        let body = Arc::clone(&remaining);
        run(vec![Statement::while_loop(
            move |_| Ok(check.load(Ordering::SeqCst) > 0),
            vec![Statement::effect(move |_| {
                body.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })],
        )])
        .unwrap();
        assert_eq!(remaining.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn conditional_section_runs_body_at_most_once() {
        let rec = Recorder::new();
        run(vec![
            Statement::conditional(|_| Ok(true), vec![rec.effect("yes-1"), rec.effect("yes-2")]),
            Statement::conditional(|_| Ok(false), vec![rec.effect("no")]),
            rec.effect("end"),
        ])
        .unwrap();
        assert_eq!(rec.entries(), vec!["yes-1", "yes-2", "end"]);
    }

    #[test]
    fn conditional_inside_loop_sees_loop_counter() {
        let rec = Recorder::new();
        run(vec![Statement::repeat(
            3,
            vec![Statement::conditional(
                |ctx| Ok(ctx.loop_counter() != 2),
                vec![counter_effect(&rec, "odd")],
            )],
        )])
        .unwrap();
        assert_eq!(rec.entries(), vec!["odd:1", "odd:3"]);
    }

    #[test]
    fn shared_chain_counters_are_independent_across_threads() {
        let rec = Recorder::new();
        let chain = Arc::new(Chain::compile(vec![Statement::repeat(3, vec![{
            let rec = rec.clone();
            Statement::effect(move |ctx| {
                let who = ctx.event().payload::<GenericEvent>()?.data()["who"]
                    .as_str()
                    .unwrap_or("?")
                    .to_string();
                rec.record(format!("{who}:{}", ctx.loop_counter()));
                std::thread::yield_now();
                Ok(())
            })
        }])]));

        let workers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|who| {
                let chain = Arc::clone(&chain);
                std::thread::spawn(move || {
                    let event = EventRef::new(GenericEvent::new(TICK, json!({ "who": who })));
                    Interpreter::default().run(&chain, &event, "shared")
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap().unwrap();
        }

        for who in ["a", "b"] {
            let mine: Vec<_> = rec
                .entries()
                .into_iter()
                .filter(|e| e.starts_with(who))
                .collect();
            assert_eq!(
                mine,
                vec![format!("{who}:1"), format!("{who}:2"), format!("{who}:3")]
            );
        }
    }

    // ── Failures & limits ────────────────────────────────────

    #[test]
    fn failing_step_aborts_rest_of_chain() {
        let rec = Recorder::new();
        let err = run(vec![
            rec.effect("before"),
            Statement::effect(|_| anyhow::bail!("no such world")),
            rec.effect("after"),
        ])
        .unwrap_err();

        assert_eq!(rec.entries(), vec!["before"]);
        assert_eq!(
            err,
            RuntimeError::handler_fault("test", "effect #1: no such world")
        );
    }

    #[test]
    fn panicking_condition_is_a_fault() {
        let err = run(vec![Statement::gated(|_| panic!("bad guard"), |_| Ok(()))]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::HandlerFault { ref message, .. } if message.contains("bad guard")
        ));
    }

    #[test]
    fn step_limit_stops_runaway_loop() {
        let chain = Arc::new(Chain::compile(vec![Statement::while_loop(
            |_| Ok(true),
            vec![Statement::effect(|_| Ok(()))],
        )]));
        let err = Interpreter::new(Some(50))
            .run(&chain, &plain_event(TICK), "spin")
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::StepLimitExceeded {
                trigger: "spin".into(),
                limit: 50
            }
        );
    }

    #[test]
    fn summary_counts_steps() {
        // effect, loop entry, body, loop re-check, body, loop exit
        let summary = run(vec![
            Statement::effect(|_| Ok(())),
            Statement::repeat(2, vec![Statement::effect(|_| Ok(()))]),
        ])
        .unwrap();
        assert_eq!(summary.steps, 6);
    }

    #[test]
    fn empty_chain_is_a_noop() {
        assert_eq!(run(Vec::new()).unwrap().steps, 0);
    }
}
