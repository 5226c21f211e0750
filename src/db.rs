//! `SQLite` persistence for session contexts and feedback

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Session Operations ====================

    /// Insert or replace the serialized context of a session
    pub fn put_session(
        &self,
        id: &str,
        context_json: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (id, context, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                context = excluded.context,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
            params![id, context_json, now.to_rfc3339(), expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetch a session that has not expired at `now`
    pub fn get_session(&self, id: &str, now: DateTime<Utc>) -> DbResult<Option<String>> {
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT context, expires_at FROM sessions WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((context, expires_at)) if parse_datetime(&expires_at) > now => Ok(Some(context)),
            Some(_) => {
                conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn delete_session(&self, id: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Drop every expired session and feedback row, returning how many went
    pub fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.conn()?;
        let now = now.to_rfc3339();
        let sessions = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
        let feedback = conn.execute("DELETE FROM feedback WHERE expires_at <= ?1", params![now])?;
        Ok(sessions + feedback)
    }

    // ==================== Feedback Operations ====================

    pub fn insert_feedback(
        &self,
        record: &FeedbackRecord,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO feedback (id, session_id, symptom, answers, recorded_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                record.session_id,
                record.symptom,
                serde_json::to_string(&record.answers)?,
                record.recorded_at.to_rfc3339(),
                expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn feedback_for_session(&self, session_id: &str) -> DbResult<Vec<FeedbackRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, symptom, answers, recorded_at FROM feedback
             WHERE session_id = ?1 ORDER BY recorded_at",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(session_id, symptom, answers, recorded_at)| {
                Ok(FeedbackRecord {
                    session_id,
                    symptom,
                    answers: serde_json::from_str(&answers)?,
                    recorded_at: parse_datetime(&recorded_at),
                })
            })
            .collect()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or(DateTime::<Utc>::MIN_UTC, |dt| dt.with_timezone(&Utc))
}
