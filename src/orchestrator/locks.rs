//! Per-session mutual exclusion
//!
//! One async mutex per session id, created on demand and dropped from the
//! table when its last user releases it.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// What a turn does when another turn holds the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPolicy {
    /// Wait for the running turn, then apply on its result
    #[default]
    Queue,
    /// Answer immediately with "turn in progress"
    Reject,
}

impl FromStr for TurnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(TurnPolicy::Queue),
            "reject" => Ok(TurnPolicy::Reject),
            other => Err(format!("unknown turn policy: {other}")),
        }
    }
}

type LockTable = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

#[derive(Default)]
pub struct SessionLocks {
    table: Arc<LockTable>,
}

/// Held for the duration of a turn
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<Mutex<()>>,
    key: String,
    table: Arc<LockTable>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `session_id`. `None` only under [`TurnPolicy::Reject`] when the
    /// session is busy.
    pub async fn acquire(&self, session_id: &str, policy: TurnPolicy) -> Option<SessionGuard> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(session_id.to_string()).or_default().clone()
        };

        let guard = match policy {
            TurnPolicy::Queue => lock.clone().lock_owned().await,
            TurnPolicy::Reject => match lock.clone().try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    drop(lock);
                    self.prune(session_id);
                    return None;
                }
            },
        };

        Some(SessionGuard {
            guard: Some(guard),
            lock,
            key: session_id.to_string(),
            table: self.table.clone(),
        })
    }

    fn prune(&self, session_id: &str) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(session_id);
        }
    }

    /// Number of sessions with a live lock entry
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table and this guard still refer to the lock: nobody waits
        let idle = table
            .get(&self.key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if idle {
            table.remove(&self.key);
        }
    }
}
