//! Per-session conversation context

use crate::flow::StateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Who produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Responder,
}

/// One entry of the conversation history. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at,
        }
    }

    pub fn responder(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: Role::Responder,
            text: text.into(),
            at,
        }
    }
}

/// A change to the fact scratchpad proposed by a handler
#[derive(Debug, Clone, PartialEq)]
pub enum FactChange {
    Set { key: String, value: Value },
    Remove(String),
    Clear,
}

impl FactChange {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        FactChange::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        FactChange::Remove(key.into())
    }
}

/// Everything the engine remembers about one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub state: StateId,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub facts: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub ended: bool,
    #[serde(default)]
    pub turns: u64,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, start: StateId, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            state: start,
            history: Vec::new(),
            facts: BTreeMap::new(),
            created_at: now,
            last_activity: now,
            ended: false,
            turns: 0,
        }
    }

    pub fn fact(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    pub fn fact_str(&self, key: &str) -> Option<&str> {
        self.facts.get(key).and_then(Value::as_str)
    }

    pub(crate) fn apply_fact(&mut self, change: FactChange) {
        match change {
            FactChange::Set { key, value } => {
                self.facts.insert(key, value);
            }
            FactChange::Remove(key) => {
                self.facts.remove(&key);
            }
            FactChange::Clear => self.facts.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fact_changes_apply_in_order() {
        let now = Utc::now();
        let mut ctx = SessionContext::new("s", StateId::WaitForSymptom, now);
        ctx.apply_fact(FactChange::set("symptom", "barks at the door"));
        ctx.apply_fact(FactChange::set("context", "mostly evenings"));
        ctx.apply_fact(FactChange::remove("context"));
        assert_eq!(ctx.fact_str("symptom"), Some("barks at the door"));
        assert!(ctx.fact("context").is_none());

        ctx.apply_fact(FactChange::Clear);
        assert!(ctx.facts.is_empty());
    }

    #[test]
    fn test_context_serializes_with_snake_case_roles() {
        let now = Utc::now();
        let mut ctx = SessionContext::new("s", StateId::Greeting, now);
        ctx.history.push(Message::responder("Wuff!", now));
        ctx.facts.insert("feedback".into(), json!(["gut"]));

        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["state"], "greeting");
        assert_eq!(value["history"][0]["role"], "responder");

        let back: SessionContext = serde_json::from_value(value).unwrap();
        assert_eq!(back, ctx);
    }
}
