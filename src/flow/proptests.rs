//! Property-based tests for the flow engine
//!
//! Random proposal sequences, legal or not, must never leave a context in an
//! undeclared state, shrink its history, or move it out of a terminal state.

use super::*;
use crate::session::{FactChange, SessionContext};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = StateId> {
    prop::sample::select(StateId::ALL.to_vec())
}

fn arb_fact_change() -> impl Strategy<Value = FactChange> {
    prop_oneof![
        ("[a-z]{1,6}", "[a-zA-Z ]{0,20}").prop_map(|(k, v)| FactChange::set(k, v)),
        "[a-z]{1,6}".prop_map(FactChange::remove),
        Just(FactChange::Clear),
    ]
}

fn arb_proposal() -> impl Strategy<Value = Proposal> {
    (
        arb_state(),
        proptest::option::of("[a-zA-Z ]{1,30}"),
        prop::collection::vec("[a-zA-Z ]{1,30}", 0..3),
        prop::collection::vec(arb_fact_change(), 0..3),
    )
        .prop_map(|(next, input, messages, facts)| Proposal {
            input,
            messages,
            next,
            facts,
        })
}

fn engine() -> FlowEngine {
    FlowEngine::new(Arc::new(FlowDefinition::standard().unwrap()))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_state_always_declared(proposals in prop::collection::vec(arb_proposal(), 1..40)) {
        let engine = engine();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut ctx = SessionContext::new("prop", engine.flow().start(), start);

        for proposal in proposals {
            let before = ctx.clone();
            let legal = engine.flow().is_allowed(ctx.state, proposal.next);
            match engine.step(&ctx, proposal, start) {
                Ok(next) => {
                    prop_assert!(legal);
                    prop_assert!(next.history.len() >= before.history.len());
                    prop_assert_eq!(&next.history[..before.history.len()], &before.history[..]);
                    ctx = next;
                }
                Err(_) => {
                    prop_assert!(!legal || before.ended);
                }
            }
            prop_assert!(engine.flow().contains(ctx.state));
            prop_assert_eq!(ctx.ended, engine.flow().is_terminal(ctx.state));
        }
    }

    #[test]
    fn prop_terminal_is_immutable(proposal in arb_proposal()) {
        let engine = engine();
        let mut ctx = SessionContext::new("prop", StateId::Greeting, Utc::now());
        ctx.state = StateId::Ended;
        ctx.ended = true;
        prop_assert_eq!(
            engine.step(&ctx, proposal, Utc::now()).unwrap_err(),
            TransitionError::SessionEnded
        );
    }

    #[test]
    fn prop_step_is_deterministic(from in arb_state(), proposal in arb_proposal()) {
        let engine = engine();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut ctx = SessionContext::new("prop", StateId::Greeting, now);
        ctx.state = from;
        ctx.ended = engine.flow().is_terminal(from);

        let a = engine.step(&ctx, proposal.clone(), now);
        let b = engine.step(&ctx, proposal, now);
        prop_assert_eq!(a, b);
    }
}
