//! Collaborators as handlers see them
//!
//! Every outbound call goes through [`ServiceBundle`], which bounds it with
//! the configured timeout and logs its outcome and duration.

use super::feedback::FeedbackSink;
use super::prompts::{PromptKey, PromptProvider};
use super::search::{SearchHit, VectorSearch};
use super::text::{Classification, CompletionRequest, GenerationParams, TextGenerator};
use super::ServiceError;
use crate::db::FeedbackRecord;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Knowledge-base collection names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub symptoms: String,
    pub instincts: String,
    pub exercises: String,
}

impl Collections {
    pub const SYMPTOM_PROPERTIES: &'static [&'static str] = &["symptom_name", "schnelldiagnose"];
    /// Properties tried in order for the text shown to the user
    pub const SYMPTOM_TEXT_PROPERTIES: &'static [&'static str] = &["schnelldiagnose", "symptom_name"];
    pub const INSTINCT_PROPERTIES: &'static [&'static str] = &["instinkt", "hundesperspektive"];
    pub const EXERCISE_PROPERTIES: &'static [&'static str] = &["anleitung"];
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            symptoms: "Symptome".to_string(),
            instincts: "Instinkte".to_string(),
            exercises: "Erziehung".to_string(),
        }
    }
}

/// Tunables the handlers read
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSettings {
    pub min_symptom_chars: usize,
    pub min_context_chars: usize,
    pub max_match_distance: f32,
    pub search_limit: usize,
    pub collections: Collections,
    pub generation: GenerationParams,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            min_symptom_chars: 25,
            min_context_chars: 25,
            max_match_distance: 0.6,
            search_limit: 3,
            collections: Collections::default(),
            generation: GenerationParams::default(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceBundle {
    text: Arc<dyn TextGenerator>,
    search: Arc<dyn VectorSearch>,
    prompts: Arc<dyn PromptProvider>,
    feedback: Arc<dyn FeedbackSink>,
    call_timeout: Duration,
    pub settings: HandlerSettings,
}

impl ServiceBundle {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        search: Arc<dyn VectorSearch>,
        prompts: Arc<dyn PromptProvider>,
        feedback: Arc<dyn FeedbackSink>,
    ) -> Self {
        Self {
            text,
            search,
            prompts,
            feedback,
            call_timeout: Duration::from_secs(20),
            settings: HandlerSettings::default(),
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: HandlerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn prompts(&self) -> &dyn PromptProvider {
        self.prompts.as_ref()
    }

    /// Model behind text generation, as reported by the generator
    pub fn model_id(&self) -> &str {
        self.text.model_id()
    }

    /// `target` names what was called: the model for text generation, the
    /// collection for search.
    async fn guarded<T, F>(
        &self,
        service: &'static str,
        target: &str,
        call: F,
    ) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>> + Send,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::timeout(format!(
                "{service} call to {target} exceeded {}ms",
                self.call_timeout.as_millis()
            ))),
        };
        let duration = start.elapsed();

        match &result {
            Ok(_) => tracing::debug!(
                service,
                target,
                duration_ms = %duration.as_millis(),
                "Collaborator call completed"
            ),
            Err(e) => tracing::warn!(
                service,
                target,
                duration_ms = %duration.as_millis(),
                error = %e.message,
                unavailable = e.is_unavailable(),
                "Collaborator call failed"
            ),
        }
        result
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        self.guarded("text_generation", self.model_id(), self.text.complete(request))
            .await
    }

    pub async fn classify(
        &self,
        text: &str,
        criteria: &str,
    ) -> Result<Classification, ServiceError> {
        self.guarded(
            "classification",
            self.model_id(),
            self.text.classify(text, criteria),
        )
            .await
    }

    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        self.guarded(
            "vector_search",
            collection,
            self.search.search(collection, query, limit),
        )
            .await
    }

    pub async fn record_feedback(&self, record: &FeedbackRecord) -> Result<(), ServiceError> {
        self.guarded("feedback_sink", "feedback", self.feedback.record(record))
            .await
    }

    /// Render copy. Catalogs are validated at startup, so a miss is logged
    /// and yields an empty string.
    pub fn prompt(&self, key: PromptKey, vars: &[(&str, &str)]) -> String {
        self.prompts.render(key, vars).unwrap_or_else(|| {
            tracing::error!(prompt = %key, "Prompt missing from catalog");
            String::new()
        })
    }

    pub fn feedback_questions(&self) -> Vec<String> {
        self.prompts.feedback_questions()
    }
}
