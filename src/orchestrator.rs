//! Turn orchestration
//!
//! Binds an inbound message to its session, runs the handler of the current
//! state, lets the flow engine arbitrate the proposed transition and chains
//! through automatic states. The stored context is written once per turn,
//! after the chain has finished; nothing a handler does reaches the store
//! before that point.

mod locks;

pub use locks::{SessionGuard, SessionLocks, TurnPolicy};

use crate::config::ConfigError;
use crate::flow::{
    FlowConfigError, FlowDefinition, FlowEngine, FlowSummary, InputMode, StateId, TransitionError,
};
use crate::handlers::{HandlerError, HandlerRegistry, Marker};
use crate::services::{validate_prompts, PromptError, PromptKey, ServiceBundle, ServiceError};
use crate::session::{issue_session_id, redact, SessionContext, SessionStore, StoreError};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on handler invocations within one turn
pub const MAX_CHAIN_STEPS: usize = 8;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_ENDED_TTL: Duration = Duration::from_secs(5 * 60);

/// Errors while assembling the engine. Turns themselves never fail.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid flow table: {0}")]
    Flow(#[from] FlowConfigError),
    #[error("Invalid handler registry: {0}")]
    Handler(#[from] HandlerError),
    #[error("Invalid prompt catalog: {0}")]
    Prompt(#[from] PromptError),
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Collaborator setup failed: {0}")]
    Service(#[from] ServiceError),
}

/// What the caller gets back for one turn
#[derive(Debug, Clone, Serialize)]
pub struct ConversationReply {
    pub session_id: String,
    pub messages: Vec<String>,
    pub ended: bool,
    #[serde(skip)]
    pub markers: Vec<Marker>,
}

/// Read-only view of a stored session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub state: StateId,
    pub label: Option<String>,
    pub turns: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ended: bool,
    pub history_len: usize,
}

/// Result of running the handler chain on a working copy
struct ChainOutcome {
    ctx: SessionContext,
    messages: Vec<String>,
    markers: Vec<(StateId, Marker)>,
}

pub struct Orchestrator {
    engine: FlowEngine,
    handlers: HandlerRegistry,
    services: ServiceBundle,
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    policy: TurnPolicy,
    session_ttl: Duration,
    ended_ttl: Duration,
}

impl Orchestrator {
    /// Assemble the engine. Fails when a non-terminal state has no handler
    /// or the prompt catalog is incomplete.
    pub fn new(
        flow: FlowDefinition,
        handlers: HandlerRegistry,
        services: ServiceBundle,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, EngineError> {
        handlers.validate(&flow)?;
        validate_prompts(services.prompts())?;

        Ok(Self {
            engine: FlowEngine::new(Arc::new(flow)),
            handlers,
            services,
            store,
            locks: SessionLocks::new(),
            policy: TurnPolicy::default(),
            session_ttl: DEFAULT_SESSION_TTL,
            ended_ttl: DEFAULT_ENDED_TTL,
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TurnPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Inactivity TTL for live sessions and the shorter TTL kept after the
    /// conversation ended
    #[must_use]
    pub fn with_ttls(mut self, session_ttl: Duration, ended_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self.ended_ttl = ended_ttl;
        self
    }

    pub fn flow_summary(&self) -> FlowSummary {
        self.engine.flow().summary()
    }

    /// Open a new session and run its entry states
    pub async fn start_session(&self) -> ConversationReply {
        self.run_turn(issue_session_id(), None).await
    }

    /// Apply one user message. Without a session id a new session is opened.
    pub async fn process_turn(&self, session_id: Option<&str>, input: &str) -> ConversationReply {
        let session_id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => issue_session_id(),
        };
        self.run_turn(session_id, Some(input)).await
    }

    pub async fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>, StoreError> {
        let Some(ctx) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        Ok(Some(SessionInfo {
            state: ctx.state,
            label: self.engine.flow().state(ctx.state).map(|def| def.label.clone()),
            turns: ctx.turns,
            created_at: ctx.created_at,
            last_activity: ctx.last_activity,
            ended: ctx.ended,
            history_len: ctx.history.len(),
        }))
    }

    /// Drop a session. Waits for a running turn on it to finish first.
    pub async fn end_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let _guard = self.locks.acquire(session_id, TurnPolicy::Queue).await;
        let existed = self.store.delete(session_id).await?;
        tracing::info!(session = %redact(session_id), existed, "Session ended by caller");
        Ok(existed)
    }

    async fn run_turn(&self, session_id: String, input: Option<&str>) -> ConversationReply {
        let started = Instant::now();
        let redacted = redact(&session_id);

        let Some(_guard) = self.locks.acquire(&session_id, self.policy).await else {
            tracing::info!(session = %redacted, "Turn rejected, another turn is running");
            return self.reply(session_id, PromptKey::TurnInProgress, false);
        };

        let before = match self.store.get(&session_id).await {
            Ok(Some(ctx)) => ctx,
            Ok(None) => {
                tracing::info!(session = %redacted, "New session");
                SessionContext::new(session_id.clone(), self.engine.flow().start(), Utc::now())
            }
            Err(e) => {
                let marker = Marker::Fatal {
                    detail: e.to_string(),
                };
                marker.log(&redacted, self.engine.flow().start());
                let mut reply = self.reply(session_id, PromptKey::GenericFailure, false);
                reply.markers.push(marker);
                return reply;
            }
        };

        if before.ended || self.engine.flow().is_terminal(before.state) {
            tracing::debug!(session = %redacted, state = %before.state, "Turn on ended session");
            return self.reply(session_id, PromptKey::ConversationEnded, true);
        }

        let outcome = match AssertUnwindSafe(self.run_chain(&before, input))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => ChainOutcome {
                ctx: before.clone(),
                messages: vec![self.services.prompt(PromptKey::GenericFailure, &[])],
                markers: vec![(
                    before.state,
                    Marker::Fatal {
                        detail: panic_detail(panic.as_ref()),
                    },
                )],
            },
        };

        for (state, marker) in &outcome.markers {
            marker.log(&redacted, *state);
        }

        let ttl = if outcome.ctx.ended {
            self.ended_ttl
        } else {
            self.session_ttl
        };
        let markers: Vec<Marker> = outcome.markers.into_iter().map(|(_, m)| m).collect();

        if let Err(e) = self.store.set(&outcome.ctx, ttl).await {
            let marker = Marker::Fatal {
                detail: e.to_string(),
            };
            marker.log(&redacted, before.state);
            let mut reply = self.reply(session_id, PromptKey::GenericFailure, false);
            reply.markers = markers;
            reply.markers.push(marker);
            return reply;
        }

        tracing::info!(
            session = %redacted,
            from = %before.state,
            to = %outcome.ctx.state,
            ended = outcome.ctx.ended,
            duration_ms = %started.elapsed().as_millis(),
            "Turn applied"
        );

        ConversationReply {
            session_id,
            messages: outcome.messages,
            ended: outcome.ctx.ended,
            markers,
        }
    }

    /// Run handlers from the current state until the flow needs the user
    /// again. Input goes to the first state that awaits it, or to a resumed
    /// automatic state at the very first step.
    async fn run_chain(&self, start: &SessionContext, input: Option<&str>) -> ChainOutcome {
        let flow = self.engine.flow();
        let mut outcome = ChainOutcome {
            ctx: start.clone(),
            messages: Vec::new(),
            markers: Vec::new(),
        };
        let mut pending = input.map(ToString::to_string);

        for step in 0..=MAX_CHAIN_STEPS {
            if step == MAX_CHAIN_STEPS {
                tracing::warn!(
                    session = %redact(&outcome.ctx.session_id),
                    state = %outcome.ctx.state,
                    "Chain step limit reached"
                );
                break;
            }

            let state = outcome.ctx.state;
            let consumes = match flow.input_mode(state) {
                InputMode::AwaitsInput if pending.is_none() => break,
                InputMode::AwaitsInput => true,
                InputMode::Automatic => step == 0 && state != flow.start(),
            };
            let input = if consumes { pending.take() } else { None };

            let result = match self
                .handlers
                .dispatch(flow, &outcome.ctx, input.as_deref(), &self.services)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    let marker = Marker::Fatal {
                        detail: e.to_string(),
                    };
                    self.recover(&mut outcome, state, marker);
                    break;
                }
            };

            let (proposal, markers) = result.into_proposal(input);
            outcome
                .markers
                .extend(markers.into_iter().map(|marker| (state, marker)));
            let messages = proposal.messages.clone();

            match self.engine.step(&outcome.ctx, proposal, Utc::now()) {
                Ok(next) => {
                    outcome.ctx = next;
                    outcome.messages.extend(messages);
                }
                Err(TransitionError::Illegal { from, to }) => {
                    self.recover(&mut outcome, state, Marker::TransitionViolation { from, to });
                    break;
                }
                Err(e) => {
                    let marker = Marker::Fatal {
                        detail: e.to_string(),
                    };
                    self.recover(&mut outcome, state, marker);
                    break;
                }
            }

            let next = outcome.ctx.state;
            if outcome.ctx.ended {
                break;
            }
            let proceed = match flow.input_mode(next) {
                InputMode::Automatic => next != state,
                InputMode::AwaitsInput => pending.is_some(),
            };
            if !proceed {
                break;
            }
        }

        outcome
    }

    /// Back to the start state after a refused step
    fn recover(&self, outcome: &mut ChainOutcome, state: StateId, marker: Marker) {
        outcome.ctx = self.engine.reset(&outcome.ctx, Utc::now());
        outcome
            .messages
            .push(self.services.prompt(PromptKey::Apology, &[]));
        outcome.markers.push((state, marker));
    }

    fn reply(&self, session_id: String, key: PromptKey, ended: bool) -> ConversationReply {
        ConversationReply {
            session_id,
            messages: vec![self.services.prompt(key, &[])],
            ended,
            markers: Vec::new(),
        }
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}
