//! Session persistence trait and the in-process stores

use super::context::SessionContext;
use super::token::redact;
use crate::db::DbError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session database error: {0}")]
    Database(#[from] DbError),
    #[error("Session context could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for session contexts, keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session. Expired sessions read as `None`.
    async fn get(&self, session_id: &str) -> Result<Option<SessionContext>, StoreError>;

    /// Store the context, replacing any previous one, live for `ttl`
    async fn set(&self, ctx: &SessionContext, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a session. Returns whether one existed.
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get(&self, session_id: &str) -> Result<Option<SessionContext>, StoreError> {
        (**self).get(session_id).await
    }

    async fn set(&self, ctx: &SessionContext, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(ctx, ttl).await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        (**self).delete(session_id).await
    }
}

// ============================================================================
// In-process store
// ============================================================================

/// Process-local store. Expired entries read as missing and are swept on
/// every write.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, (SessionContext, Instant)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionContext>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(session_id) {
            Some((ctx, expires)) if *expires > Instant::now() => Ok(Some(ctx.clone())),
            Some(_) => {
                entries.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, ctx: &SessionContext, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(ctx.session_id.clone(), (ctx.clone(), now + ttl));
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().await.remove(session_id).is_some())
    }
}

// ============================================================================
// Degrading wrapper
// ============================================================================

/// Uses `primary` while it works and falls back to an in-process store when
/// it fails. The fallback only ever holds copies newer than the primary's:
/// a successful primary write drops the fallback entry, so reads consult the
/// fallback first.
pub struct FallbackSessionStore {
    primary: Arc<dyn SessionStore>,
    fallback: MemorySessionStore,
}

impl FallbackSessionStore {
    pub fn new(primary: Arc<dyn SessionStore>) -> Self {
        Self {
            primary,
            fallback: MemorySessionStore::new(),
        }
    }
}

#[async_trait]
impl SessionStore for FallbackSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionContext>, StoreError> {
        if let Some(ctx) = self.fallback.get(session_id).await? {
            return Ok(Some(ctx));
        }
        match self.primary.get(session_id).await {
            Ok(ctx) => Ok(ctx),
            Err(e) => {
                tracing::warn!(session = %redact(session_id), error = %e, "Session store read failed, using in-process store");
                Ok(None)
            }
        }
    }

    async fn set(&self, ctx: &SessionContext, ttl: Duration) -> Result<(), StoreError> {
        match self.primary.set(ctx, ttl).await {
            Ok(()) => {
                // A newer copy now lives in the primary
                self.fallback.delete(&ctx.session_id).await?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %redact(&ctx.session_id), error = %e, "Session store write failed, using in-process store");
                self.fallback.set(ctx, ttl).await?;
                // The primary may still hold an older turn of this session
                if let Err(e) = self.primary.delete(&ctx.session_id).await {
                    tracing::warn!(session = %redact(&ctx.session_id), error = %e, "Stale session copy left in store");
                }
                Ok(())
            }
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let in_fallback = self.fallback.delete(session_id).await?;
        match self.primary.delete(session_id).await {
            Ok(in_primary) => Ok(in_primary || in_fallback),
            Err(e) => {
                tracing::warn!(session = %redact(session_id), error = %e, "Session store delete failed");
                Ok(in_fallback)
            }
        }
    }
}
