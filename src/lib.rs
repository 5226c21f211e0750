//! `WuffChat` conversation engine
//!
//! A finite-state conversation engine that walks a user from a description of
//! their dog's behavior to a persona-voiced explanation. The state machine is
//! kept pure; collaborators (text generation, vector search, session
//! persistence, prompts) are injected through narrow traits.

pub mod config;
pub mod db;
pub mod flow;
pub mod handlers;
pub mod orchestrator;
pub mod services;
pub mod session;

#[cfg(test)]
pub mod testing;

pub use config::EngineConfig;
pub use flow::{FlowDefinition, FlowEngine, StateId};
pub use orchestrator::{ConversationReply, Orchestrator, TurnPolicy};
pub use session::{SessionContext, SessionStore};
