//! Adapter to use [`Database`] as a [`SessionStore`]

use super::context::SessionContext;
use super::store::{SessionStore, StoreError};
use crate::db::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Longest retention the store honours
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(ttl.min(MAX_TTL)).unwrap_or_else(|_| chrono::Duration::zero())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionContext>, StoreError> {
        match self.db.get_session(session_id, Utc::now())? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, ctx: &SessionContext, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(ctx)?;
        let now = Utc::now();
        self.db
            .put_session(&ctx.session_id, &json, now, expiry(now, ttl))?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.db.delete_session(session_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::StateId;
    use crate::session::{FactChange, Message};

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let store = SqliteSessionStore::new(Database::open_in_memory().unwrap());
        let now = Utc::now();
        let mut ctx = SessionContext::new("abc", StateId::WaitForContext, now);
        ctx.history.push(Message::user("Mein Hund bellt ständig", now));
        ctx.apply_fact(FactChange::set("symptom", "Mein Hund bellt ständig"));

        store.set(&ctx, Duration::from_secs(60)).await.unwrap();
        let loaded = store.get("abc").await.unwrap().unwrap();
        assert_eq!(loaded, ctx);

        assert!(store.delete("abc").await.unwrap());
        assert!(store.get("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_zero_ttl_is_expired() {
        let store = SqliteSessionStore::new(Database::open_in_memory().unwrap());
        let ctx = SessionContext::new("abc", StateId::Greeting, Utc::now());
        store.set(&ctx, Duration::ZERO).await.unwrap();
        assert!(store.get("abc").await.unwrap().is_none());
    }

    #[test]
    fn test_expiry_is_capped() {
        let now = Utc::now();
        assert_eq!(expiry(now, Duration::MAX), expiry(now, MAX_TTL));
        assert!(expiry(now, Duration::MAX) < now + chrono::Duration::days(365 * 101));
        assert_eq!(
            expiry(now, Duration::from_secs(60)),
            now + chrono::Duration::seconds(60)
        );
    }
}
