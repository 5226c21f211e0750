//! Conversation flow: states, the legal transition table and the engine that
//! arbitrates transitions.
//!
//! The table is data; the decision of *which* legal target to take belongs to
//! the handler bound to each state.

pub mod definition;
pub mod engine;
pub mod state;

#[cfg(test)]
mod proptests;

pub use definition::{FlowConfigError, FlowDefinition, FlowSummary, FlowTable};
pub use engine::{FlowEngine, Proposal, TransitionError};
pub use state::{InputMode, StateDef, StateId};
