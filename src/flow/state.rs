//! Conversation state types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every state the engine knows how to handle.
///
/// Which of them a deployment actually uses, and how they connect, is decided
/// by the [`FlowTable`](super::FlowTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateId {
    /// Entry point, emits the introduction
    Greeting,
    /// Waiting for a description of the behavior
    WaitForSymptom,
    /// Collecting situational context (also the retrieval fallback)
    WaitForContext,
    /// Knowledge-base lookup for the described behavior
    RetrieveMatch,
    /// Match shown, waiting for "do you want to know more"
    WaitForConfirmation,
    /// Persona-voiced explanation
    Diagnosis,
    /// Offered a training exercise
    AskForExercise,
    /// Offered to analyse another behavior
    EndOrRestart,
    /// Feedback questionnaire
    Feedback,
    /// Conversation is over
    Ended,
}

impl StateId {
    pub const ALL: [StateId; 10] = [
        StateId::Greeting,
        StateId::WaitForSymptom,
        StateId::WaitForContext,
        StateId::RetrieveMatch,
        StateId::WaitForConfirmation,
        StateId::Diagnosis,
        StateId::AskForExercise,
        StateId::EndOrRestart,
        StateId::Feedback,
        StateId::Ended,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StateId::Greeting => "greeting",
            StateId::WaitForSymptom => "wait_for_symptom",
            StateId::WaitForContext => "wait_for_context",
            StateId::RetrieveMatch => "retrieve_match",
            StateId::WaitForConfirmation => "wait_for_confirmation",
            StateId::Diagnosis => "diagnosis",
            StateId::AskForExercise => "ask_for_exercise",
            StateId::EndOrRestart => "end_or_restart",
            StateId::Feedback => "feedback",
            StateId::Ended => "ended",
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a state consumes user input or runs as soon as it is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    AwaitsInput,
    Automatic,
}

/// Static description of a declared state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDef {
    pub id: StateId,
    pub label: String,
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub input: InputMode,
}

impl StateDef {
    pub fn new(id: StateId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            terminal: false,
            input: InputMode::AwaitsInput,
        }
    }

    #[must_use]
    pub fn automatic(mut self) -> Self {
        self.input = InputMode::Automatic;
        self
    }

    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}
