//! Transition arbitration
//!
//! The engine is pure: given a context and a proposal it returns the next
//! context or refuses. It never calls a handler or a collaborator, and the
//! clock is passed in.

use super::{FlowDefinition, StateId};
use crate::session::{FactChange, Message, SessionContext};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// A transition proposed by the handler of the current state
#[derive(Debug, Clone)]
pub struct Proposal {
    /// User input consumed by this step, if any
    pub input: Option<String>,
    pub messages: Vec<String>,
    pub next: StateId,
    pub facts: Vec<FactChange>,
}

impl Proposal {
    pub fn new(next: StateId) -> Self {
        Self {
            input: None,
            messages: Vec::new(),
            next,
            facts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Why a proposal was refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Session has already ended")]
    SessionEnded,
    #[error("Current state {0} is not declared in the flow")]
    UnknownState(StateId),
    #[error("Illegal transition {from} -> {to}")]
    Illegal { from: StateId, to: StateId },
}

#[derive(Debug, Clone)]
pub struct FlowEngine {
    flow: Arc<FlowDefinition>,
}

impl FlowEngine {
    pub fn new(flow: Arc<FlowDefinition>) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    /// Validate `proposal` against the flow and apply it to a copy of `ctx`.
    pub fn step(
        &self,
        ctx: &SessionContext,
        proposal: Proposal,
        now: DateTime<Utc>,
    ) -> Result<SessionContext, TransitionError> {
        if ctx.ended || self.flow.is_terminal(ctx.state) {
            return Err(TransitionError::SessionEnded);
        }
        if !self.flow.contains(ctx.state) {
            return Err(TransitionError::UnknownState(ctx.state));
        }
        if !self.flow.is_allowed(ctx.state, proposal.next) {
            return Err(TransitionError::Illegal {
                from: ctx.state,
                to: proposal.next,
            });
        }

        let mut next = ctx.clone();
        next.state = proposal.next;
        if let Some(input) = proposal.input {
            next.history.push(Message::user(input, now));
        }
        next.history.extend(
            proposal
                .messages
                .into_iter()
                .map(|text| Message::responder(text, now)),
        );
        for change in proposal.facts {
            next.apply_fact(change);
        }
        next.last_activity = now;
        next.ended = self.flow.is_terminal(next.state);
        next.turns += 1;
        Ok(next)
    }

    /// Return the context to the start state. History is kept, facts are not.
    pub fn reset(&self, ctx: &SessionContext, now: DateTime<Utc>) -> SessionContext {
        let mut next = ctx.clone();
        next.state = self.flow.start();
        next.facts.clear();
        next.ended = false;
        next.last_activity = now;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn engine() -> FlowEngine {
        FlowEngine::new(Arc::new(FlowDefinition::standard().unwrap()))
    }

    fn ctx_at(state: StateId) -> SessionContext {
        let mut ctx = SessionContext::new("test", StateId::Greeting, Utc::now());
        ctx.state = state;
        ctx
    }

    #[test]
    fn test_legal_step_applies_everything() {
        let engine = engine();
        let ctx = ctx_at(StateId::WaitForSymptom);
        let now = Utc::now();

        let mut proposal = Proposal::new(StateId::WaitForContext)
            .with_input("My dog barks at every passing cyclist");
        proposal.messages.push("Where does it happen?".into());
        proposal
            .facts
            .push(FactChange::set("symptom", "My dog barks at every passing cyclist"));

        let next = engine.step(&ctx, proposal, now).unwrap();
        assert_eq!(next.state, StateId::WaitForContext);
        assert_eq!(next.history.len(), 2);
        assert_eq!(next.history[0].role, Role::User);
        assert_eq!(next.history[1].role, Role::Responder);
        assert_eq!(
            next.fact_str("symptom"),
            Some("My dog barks at every passing cyclist")
        );
        assert_eq!(next.last_activity, now);
        assert_eq!(next.turns, 1);
        assert!(!next.ended);

        // Original untouched
        assert_eq!(ctx.state, StateId::WaitForSymptom);
        assert!(ctx.history.is_empty());
    }

    #[test]
    fn test_illegal_target_refused() {
        let engine = engine();
        let ctx = ctx_at(StateId::WaitForSymptom);
        let err = engine
            .step(&ctx, Proposal::new(StateId::Diagnosis), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: StateId::WaitForSymptom,
                to: StateId::Diagnosis
            }
        );
    }

    #[test]
    fn test_terminal_context_refused() {
        let engine = engine();
        let mut ctx = ctx_at(StateId::Ended);
        ctx.ended = true;
        let err = engine
            .step(&ctx, Proposal::new(StateId::WaitForSymptom), Utc::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::SessionEnded);
    }

    #[test]
    fn test_reaching_terminal_sets_ended() {
        let engine = engine();
        let ctx = ctx_at(StateId::Feedback);
        let next = engine
            .step(&ctx, Proposal::new(StateId::Ended), Utc::now())
            .unwrap();
        assert!(next.ended);
    }

    #[test]
    fn test_undeclared_state_refused() {
        let table = crate::flow::FlowTable {
            start: StateId::Greeting,
            states: vec![
                crate::flow::StateDef::new(StateId::Greeting, "Greeting").automatic(),
                crate::flow::StateDef::new(StateId::Ended, "Ended").terminal(),
            ],
            transitions: vec![crate::flow::definition::TransitionDef {
                from: StateId::Greeting,
                to: vec![StateId::Ended],
            }],
        };
        let engine = FlowEngine::new(Arc::new(FlowDefinition::from_table(table).unwrap()));
        let ctx = ctx_at(StateId::Feedback);
        let err = engine
            .step(&ctx, Proposal::new(StateId::Ended), Utc::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::UnknownState(StateId::Feedback));
    }

    #[test]
    fn test_reset_keeps_history_clears_facts() {
        let engine = engine();
        let mut ctx = ctx_at(StateId::Diagnosis);
        ctx.history.push(Message::user("hello", Utc::now()));
        ctx.apply_fact(FactChange::set("symptom", "x"));

        let reset = engine.reset(&ctx, Utc::now());
        assert_eq!(reset.state, StateId::Greeting);
        assert!(reset.facts.is_empty());
        assert_eq!(reset.history, ctx.history);
    }
}
