//! Per-state handlers
//!
//! A handler decides what its state does with an input: which messages to
//! emit, which facts to record and which legal target to propose. How states
//! connect is the flow table's business, not the handler's.

mod confirmation;
mod context;
mod diagnosis;
mod end_or_restart;
mod exercise;
mod feedback;
mod greeting;
pub mod input;
mod result;
mod retrieval;
mod symptom;

pub use confirmation::ConfirmationHandler;
pub use context::ContextHandler;
pub use diagnosis::DiagnosisHandler;
pub use end_or_restart::EndOrRestartHandler;
pub use exercise::ExerciseOfferHandler;
pub use feedback::FeedbackHandler;
pub use greeting::GreetingHandler;
pub use result::{HandlerResult, Marker};
pub use retrieval::RetrievalHandler;
pub use symptom::SymptomHandler;

use crate::flow::{FlowDefinition, InputMode, StateId};
use crate::services::{PromptKey, ServiceBundle, ServiceError};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("No handler bound to state {0}")]
    Unbound(StateId),
}

/// Business logic of one state
#[async_trait]
pub trait StateHandler: Send + Sync {
    /// The state this handler is bound to
    fn state(&self) -> StateId;

    /// Handle `input` (absent for automatic states). Must not fail: collaborator
    /// errors become messages and markers.
    async fn handle(
        &self,
        ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult;
}

/// Lookup table from state to handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<StateId, Arc<dyn StateHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for every non-terminal state of the standard flow
    pub fn standard() -> Self {
        Self::new()
            .with(GreetingHandler)
            .with(SymptomHandler)
            .with(ContextHandler)
            .with(RetrievalHandler)
            .with(ConfirmationHandler)
            .with(DiagnosisHandler)
            .with(ExerciseOfferHandler)
            .with(EndOrRestartHandler)
            .with(FeedbackHandler)
    }

    #[must_use]
    pub fn with(mut self, handler: impl StateHandler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    /// Bind `handler` to its state, replacing any earlier binding
    pub fn register(&mut self, handler: Arc<dyn StateHandler>) {
        self.handlers.insert(handler.state(), handler);
    }

    pub fn get(&self, state: StateId) -> Option<&Arc<dyn StateHandler>> {
        self.handlers.get(&state)
    }

    /// Every non-terminal state of `flow` must have a handler
    pub fn validate(&self, flow: &FlowDefinition) -> Result<(), HandlerError> {
        flow.states()
            .filter(|def| !def.terminal)
            .find(|def| !self.handlers.contains_key(&def.id))
            .map_or(Ok(()), |def| Err(HandlerError::Unbound(def.id)))
    }

    /// Run the handler for the current state. A restart command in an
    /// input-awaiting state is answered here without reaching the handler.
    pub async fn dispatch(
        &self,
        flow: &FlowDefinition,
        ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> Result<HandlerResult, HandlerError> {
        let restart_target = StateId::WaitForSymptom;
        if let Some(text) = input {
            if flow.input_mode(ctx.state) == InputMode::AwaitsInput
                && input::is_restart_command(text)
                && flow.is_allowed(ctx.state, restart_target)
            {
                return Ok(HandlerResult::new(restart_target)
                    .with_message(services.prompt(PromptKey::RestartConfirmed, &[]))
                    .with_fact(FactChange::Clear));
            }
        }

        let handler = self
            .get(ctx.state)
            .ok_or(HandlerError::Unbound(ctx.state))?;
        Ok(handler.handle(ctx, input, services).await)
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Collaborator failure with no degraded path: apologise and stay put
pub(crate) fn unavailable(
    state: StateId,
    services: &ServiceBundle,
    service: &'static str,
    error: &ServiceError,
) -> HandlerResult {
    HandlerResult::new(state)
        .with_message(services.prompt(PromptKey::Unavailable, &[]))
        .with_marker(Marker::collaborator(service, error))
}

/// Answer was neither yes nor no
pub(crate) fn ask_yes_no_again(state: StateId, services: &ServiceBundle) -> HandlerResult {
    HandlerResult::new(state)
        .with_message(services.prompt(PromptKey::RequestYesNo, &[]))
        .with_marker(Marker::InputRejected {
            reason: "unclear_yes_no",
        })
}

/// Start the feedback questionnaire
pub(crate) fn begin_feedback(services: &ServiceBundle) -> HandlerResult {
    let mut result = HandlerResult::new(StateId::Feedback)
        .with_message(services.prompt(PromptKey::FeedbackIntro, &[]))
        .with_fact(FactChange::set("feedback", serde_json::Value::Array(Vec::new())));
    if let Some(first) = services.feedback_questions().into_iter().next() {
        result = result.with_message(first);
    }
    result
}

/// The best match's short explanation, as recorded by retrieval
pub(crate) fn match_text(ctx: &SessionContext) -> String {
    let Some(record) = ctx.fact("match") else {
        return String::new();
    };
    crate::services::Collections::SYMPTOM_TEXT_PROPERTIES
        .iter()
        .find_map(|name| record.get(*name).and_then(serde_json::Value::as_str))
        .map_or_else(|| record.to_string(), ToString::to_string)
}
