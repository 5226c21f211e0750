//! Feedback sink

use super::ServiceError;
use crate::db::{Database, FeedbackRecord};
use crate::session::sqlite::expiry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Feedback is kept for 90 days
pub const FEEDBACK_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, record: &FeedbackRecord) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: FeedbackSink + ?Sized> FeedbackSink for Arc<T> {
    async fn record(&self, record: &FeedbackRecord) -> Result<(), ServiceError> {
        (**self).record(record).await
    }
}

/// Keeps feedback in process memory
#[derive(Default)]
pub struct MemoryFeedbackSink {
    records: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<FeedbackRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl FeedbackSink for MemoryFeedbackSink {
    async fn record(&self, record: &FeedbackRecord) -> Result<(), ServiceError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Adapter to use [`Database`] as a [`FeedbackSink`]
#[derive(Clone)]
pub struct SqliteFeedbackSink {
    db: Database,
    retention: Duration,
}

impl SqliteFeedbackSink {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            retention: FEEDBACK_RETENTION,
        }
    }
}

#[async_trait]
impl FeedbackSink for SqliteFeedbackSink {
    async fn record(&self, record: &FeedbackRecord) -> Result<(), ServiceError> {
        self.db
            .insert_feedback(record, expiry(record.recorded_at, self.retention))
            .map_err(|e| ServiceError::unknown(format!("Failed to store feedback: {e}")))
    }
}
