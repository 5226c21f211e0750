//! Mock collaborators for testing
//!
//! These mocks let handlers and the orchestrator run without network or
//! disk I/O. Responses are queued up front; calls are recorded.

use crate::db::FeedbackRecord;
use crate::flow::StateId;
use crate::services::{
    Classification, CompletionRequest, FeedbackSink, HandlerSettings, MemoryFeedbackSink,
    PromptCatalog, SearchHit, ServiceBundle, ServiceError, TextGenerator, VectorSearch,
};
use crate::session::{SessionContext, SessionStore, StoreError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SHIPPED_PROMPTS: &str = include_str!("../config/prompts.json");

pub fn test_catalog() -> PromptCatalog {
    PromptCatalog::from_json(SHIPPED_PROMPTS).unwrap()
}

/// Context parked in `state`, as if the flow had led there
pub fn test_context(state: StateId) -> SessionContext {
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut ctx = SessionContext::new("test-session", StateId::Greeting, created);
    ctx.state = state;
    ctx
}

/// Search hit from a JSON object literal
pub fn hit(properties: Value, distance: f32) -> SearchHit {
    SearchHit {
        properties: properties.as_object().cloned().unwrap_or_default(),
        distance,
    }
}

// ============================================================================
// Mock Text Generator
// ============================================================================

/// Text generator returning queued responses
#[derive(Default)]
pub struct MockTextGenerator {
    completions: Mutex<VecDeque<Result<String, ServiceError>>>,
    classifications: Mutex<VecDeque<Result<Classification, ServiceError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    classify_calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_completion(&self, response: Result<String, ServiceError>) {
        self.completions.lock().unwrap().push_back(response);
    }

    pub fn queue_classification(&self, response: Result<Classification, ServiceError>) {
        self.classifications.lock().unwrap().push_back(response);
    }

    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn classify_calls(&self) -> Vec<(String, String)> {
        self.classify_calls.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        self.pause().await;
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::network("No mock completion queued")))
    }

    async fn classify(&self, text: &str, criteria: &str) -> Result<Classification, ServiceError> {
        self.classify_calls
            .lock()
            .unwrap()
            .push((text.to_string(), criteria.to_string()));
        self.pause().await;
        self.classifications
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::network("No mock classification queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Vector Search
// ============================================================================

/// Vector search with per-collection queues. An empty queue answers with no
/// hits.
#[derive(Default)]
pub struct MockVectorSearch {
    responses: Mutex<HashMap<String, VecDeque<Result<Vec<SearchHit>, ServiceError>>>>,
    calls: Mutex<Vec<(String, String, usize)>>,
    delay: Option<Duration>,
}

impl MockVectorSearch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue(&self, collection: &str, response: Result<Vec<SearchHit>, ServiceError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push_back(response);
    }

    /// Recorded `(collection, query, limit)` triples
    pub fn calls(&self) -> Vec<(String, String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorSearch for MockVectorSearch {
    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((collection.to_string(), query.to_string(), limit));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .get_mut(collection)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ============================================================================
// Failure injection
// ============================================================================

/// Session store that is always down
pub struct FailingSessionStore;

#[async_trait]
impl SessionStore for FailingSessionStore {
    async fn get(&self, _session_id: &str) -> Result<Option<SessionContext>, StoreError> {
        Err(StoreError::Unavailable("injected".into()))
    }

    async fn set(&self, _ctx: &SessionContext, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("injected".into()))
    }

    async fn delete(&self, _session_id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("injected".into()))
    }
}

/// Feedback sink that rejects every record
pub struct FailingFeedbackSink;

#[async_trait]
impl FeedbackSink for FailingFeedbackSink {
    async fn record(&self, _record: &FeedbackRecord) -> Result<(), ServiceError> {
        Err(ServiceError::server_error("injected"))
    }
}

// ============================================================================
// Service bundle builder
// ============================================================================

/// Builds a [`ServiceBundle`] from mocks, keeping handles for assertions
pub struct TestServices {
    pub text: Arc<MockTextGenerator>,
    pub search: Arc<MockVectorSearch>,
    pub feedback: Arc<MemoryFeedbackSink>,
    feedback_sink: Option<Arc<dyn FeedbackSink>>,
    settings: HandlerSettings,
    call_timeout: Duration,
}

impl Default for TestServices {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServices {
    pub fn new() -> Self {
        Self {
            text: Arc::new(MockTextGenerator::new()),
            search: Arc::new(MockVectorSearch::new()),
            feedback: Arc::new(MemoryFeedbackSink::new()),
            feedback_sink: None,
            settings: HandlerSettings::default(),
            call_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: Arc<MockTextGenerator>) -> Self {
        self.text = text;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: Arc<MockVectorSearch>) -> Self {
        self.search = search;
        self
    }

    #[must_use]
    pub fn with_feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: HandlerSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn build(&self) -> ServiceBundle {
        let feedback: Arc<dyn FeedbackSink> = match &self.feedback_sink {
            Some(sink) => sink.clone(),
            None => self.feedback.clone(),
        };
        ServiceBundle::new(
            self.text.clone(),
            self.search.clone(),
            Arc::new(test_catalog()),
            feedback,
        )
        .with_call_timeout(self.call_timeout)
        .with_settings(self.settings.clone())
    }
}
