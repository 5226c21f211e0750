//! Flow table: declared states and the legal targets of each state
//!
//! Built once at startup and immutable afterwards. Any inconsistency in the
//! table is a configuration error and fails assembly, never a runtime error.

use super::state::{InputMode, StateDef, StateId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Errors found while validating a flow table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowConfigError {
    #[error("State declared more than once: {0}")]
    DuplicateState(StateId),
    #[error("Transition references undeclared state: {0}")]
    UndeclaredState(StateId),
    #[error("Start state {0} is not declared")]
    UndeclaredStart(StateId),
    #[error("Start state {0} must not be terminal")]
    TerminalStart(StateId),
    #[error("Terminal state {0} declares outgoing transitions")]
    TerminalHasTransitions(StateId),
    #[error("Non-terminal state {0} has no outgoing transitions")]
    DeadEnd(StateId),
    #[error("State {0} is unreachable from the start state")]
    Unreachable(StateId),
    #[error("No terminal state is reachable from the start state")]
    NoReachableTerminal,
    #[error("Invalid flow table document: {0}")]
    Parse(String),
}

/// Outgoing edges of one source state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDef {
    pub from: StateId,
    pub to: Vec<StateId>,
}

/// Serializable flow table, the per-deployment configuration of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTable {
    pub start: StateId,
    pub states: Vec<StateDef>,
    pub transitions: Vec<TransitionDef>,
}

impl FlowTable {
    /// The table used when a deployment does not supply its own.
    pub fn standard() -> Self {
        use StateId::{
            AskForExercise, Diagnosis, EndOrRestart, Ended, Feedback, Greeting, RetrieveMatch,
            WaitForConfirmation, WaitForContext, WaitForSymptom,
        };

        let states = vec![
            StateDef::new(Greeting, "Greeting").automatic(),
            StateDef::new(WaitForSymptom, "Describe the behavior"),
            StateDef::new(WaitForContext, "Describe the situation"),
            StateDef::new(RetrieveMatch, "Look up the behavior").automatic(),
            StateDef::new(WaitForConfirmation, "Confirm interest"),
            StateDef::new(Diagnosis, "Explain from the dog's perspective").automatic(),
            StateDef::new(AskForExercise, "Offer an exercise"),
            StateDef::new(EndOrRestart, "Offer another behavior"),
            StateDef::new(Feedback, "Collect feedback"),
            StateDef::new(Ended, "Conversation ended").terminal(),
        ];

        let edge = |from: StateId, to: &[StateId]| TransitionDef {
            from,
            to: to.to_vec(),
        };

        let transitions = vec![
            edge(Greeting, &[WaitForSymptom]),
            edge(WaitForSymptom, &[WaitForSymptom, WaitForContext]),
            edge(WaitForContext, &[WaitForContext, RetrieveMatch, WaitForSymptom]),
            edge(RetrieveMatch, &[RetrieveMatch, WaitForContext, WaitForConfirmation]),
            edge(WaitForConfirmation, &[WaitForConfirmation, Diagnosis, WaitForSymptom]),
            edge(Diagnosis, &[Diagnosis, AskForExercise]),
            edge(
                AskForExercise,
                &[AskForExercise, EndOrRestart, Feedback, WaitForSymptom],
            ),
            edge(EndOrRestart, &[EndOrRestart, WaitForSymptom, Feedback]),
            edge(Feedback, &[Feedback, Ended, WaitForSymptom]),
        ];

        Self {
            start: Greeting,
            states,
            transitions,
        }
    }
}

/// Validated, read-only flow definition
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    start: StateId,
    states: BTreeMap<StateId, StateDef>,
    targets: BTreeMap<StateId, BTreeSet<StateId>>,
}

impl FlowDefinition {
    pub fn standard() -> Result<Self, FlowConfigError> {
        Self::from_table(FlowTable::standard())
    }

    pub fn from_json(document: &str) -> Result<Self, FlowConfigError> {
        let table: FlowTable =
            serde_json::from_str(document).map_err(|e| FlowConfigError::Parse(e.to_string()))?;
        Self::from_table(table)
    }

    pub fn from_table(table: FlowTable) -> Result<Self, FlowConfigError> {
        let mut states = BTreeMap::new();
        for def in table.states {
            let id = def.id;
            if states.insert(id, def).is_some() {
                return Err(FlowConfigError::DuplicateState(id));
            }
        }

        let start_def = states
            .get(&table.start)
            .ok_or(FlowConfigError::UndeclaredStart(table.start))?;
        if start_def.terminal {
            return Err(FlowConfigError::TerminalStart(table.start));
        }

        let mut targets: BTreeMap<StateId, BTreeSet<StateId>> = BTreeMap::new();
        for transition in table.transitions {
            if !states.contains_key(&transition.from) {
                return Err(FlowConfigError::UndeclaredState(transition.from));
            }
            for to in &transition.to {
                if !states.contains_key(to) {
                    return Err(FlowConfigError::UndeclaredState(*to));
                }
            }
            targets
                .entry(transition.from)
                .or_default()
                .extend(transition.to);
        }

        for def in states.values() {
            let outgoing = targets.get(&def.id).map_or(0, BTreeSet::len);
            if def.terminal && outgoing > 0 {
                return Err(FlowConfigError::TerminalHasTransitions(def.id));
            }
            if !def.terminal && outgoing == 0 {
                return Err(FlowConfigError::DeadEnd(def.id));
            }
        }

        let definition = Self {
            start: table.start,
            states,
            targets,
        };

        let reachable = definition.reachable_from(definition.start);
        if let Some(orphan) = definition.states.keys().find(|id| !reachable.contains(id)) {
            return Err(FlowConfigError::Unreachable(*orphan));
        }
        if !reachable.iter().any(|id| definition.is_terminal(*id)) {
            return Err(FlowConfigError::NoReachableTerminal);
        }

        Ok(definition)
    }

    fn reachable_from(&self, origin: StateId) -> BTreeSet<StateId> {
        let mut seen = BTreeSet::from([origin]);
        let mut queue = VecDeque::from([origin]);
        while let Some(current) = queue.pop_front() {
            for next in self.allowed_targets(current) {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        seen
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn states(&self) -> impl Iterator<Item = &StateDef> {
        self.states.values()
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn state(&self, id: StateId) -> Option<&StateDef> {
        self.states.get(&id)
    }

    /// Legal targets of `id`; empty for terminal or undeclared states.
    pub fn allowed_targets(&self, id: StateId) -> impl Iterator<Item = &StateId> {
        self.targets.get(&id).into_iter().flatten()
    }

    pub fn is_allowed(&self, from: StateId, to: StateId) -> bool {
        self.targets.get(&from).is_some_and(|set| set.contains(&to))
    }

    pub fn is_terminal(&self, id: StateId) -> bool {
        self.states.get(&id).is_some_and(|def| def.terminal)
    }

    pub fn input_mode(&self, id: StateId) -> InputMode {
        self.states
            .get(&id)
            .map_or(InputMode::AwaitsInput, |def| def.input)
    }

    pub fn summary(&self) -> FlowSummary {
        FlowSummary {
            start: self.start,
            states: self.states.values().cloned().collect(),
            transitions: self
                .targets
                .iter()
                .map(|(from, to)| TransitionDef {
                    from: *from,
                    to: to.iter().copied().collect(),
                })
                .collect(),
        }
    }
}

/// Debug view of a validated definition
pub type FlowSummary = FlowTable;
