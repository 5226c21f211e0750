//! What a handler hands back to the orchestrator

use crate::flow::{Proposal, StateId};
use crate::session::FactChange;

/// Side-effect notes. Logged by the orchestrator, never used for control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    FactRecorded { key: String },
    InputRejected { reason: &'static str },
    CollaboratorFailed { service: &'static str, detail: String },
    FeedbackSaved,
    FeedbackSaveFailed { detail: String },
    TransitionViolation { from: StateId, to: StateId },
    Fatal { detail: String },
}

impl Marker {
    pub fn fact(key: impl Into<String>) -> Self {
        Marker::FactRecorded { key: key.into() }
    }

    pub fn collaborator(service: &'static str, detail: impl ToString) -> Self {
        Marker::CollaboratorFailed {
            service,
            detail: detail.to_string(),
        }
    }

    pub fn log(&self, session: &str, state: StateId) {
        match self {
            Marker::FactRecorded { key } => {
                tracing::debug!(session, %state, key = %key, "Fact recorded");
            }
            Marker::InputRejected { reason } => {
                tracing::info!(session, %state, reason, "Input rejected");
            }
            Marker::CollaboratorFailed { service, detail } => {
                tracing::warn!(session, %state, service, detail = %detail, "Collaborator failed");
            }
            Marker::FeedbackSaved => tracing::info!(session, "Feedback saved"),
            Marker::FeedbackSaveFailed { detail } => {
                tracing::error!(session, detail = %detail, "Feedback could not be saved");
            }
            Marker::TransitionViolation { from, to } => {
                tracing::error!(session, %from, %to, "Handler proposed an illegal transition");
            }
            Marker::Fatal { detail } => {
                tracing::error!(session, %state, detail = %detail, "Turn aborted");
            }
        }
    }
}

/// Output of one handler invocation
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult {
    pub messages: Vec<String>,
    pub next: StateId,
    pub facts: Vec<FactChange>,
    pub markers: Vec<Marker>,
}

impl HandlerResult {
    pub fn new(next: StateId) -> Self {
        Self {
            messages: Vec::new(),
            next,
            facts: Vec::new(),
            markers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    #[must_use]
    pub fn with_fact(mut self, change: FactChange) -> Self {
        if let FactChange::Set { key, .. } = &change {
            self.markers.push(Marker::fact(key.clone()));
        }
        self.facts.push(change);
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Split into the engine's proposal and the markers to log
    pub fn into_proposal(self, input: Option<String>) -> (Proposal, Vec<Marker>) {
        let proposal = Proposal {
            input,
            messages: self.messages,
            next: self.next,
            facts: self.facts,
        };
        (proposal, self.markers)
    }
}
