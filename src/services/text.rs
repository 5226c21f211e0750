//! Text generation collaborator

use super::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sampling parameters passed through to the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub params: GenerationParams,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            params: GenerationParams::default(),
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Short yes/no question asking whether `text` meets `criteria`
    pub fn classification(text: &str, criteria: &str) -> Self {
        Self::new(format!("{criteria}\n{text}")).with_params(GenerationParams {
            temperature: 0.3,
            max_tokens: Some(3),
        })
    }
}

/// Outcome of a yes/no classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub matches: bool,
    /// The model's raw verdict, normalised to lower case
    pub label: String,
}

impl Classification {
    /// Interpret a short model answer such as "Ja." or "no"
    pub fn from_answer(answer: &str) -> Self {
        let label = answer
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        let matches = matches!(label.as_str(), "ja" | "yes" | "true");
        Self { matches, label }
    }
}

/// Client for generating text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;

    /// Decide whether `text` satisfies `criteria`
    async fn classify(&self, text: &str, criteria: &str) -> Result<Classification, ServiceError> {
        let answer = self
            .complete(&CompletionRequest::classification(text, criteria))
            .await?;
        Ok(Classification::from_answer(&answer))
    }

    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        (**self).complete(request).await
    }

    async fn classify(&self, text: &str, criteria: &str) -> Result<Classification, ServiceError> {
        (**self).classify(text, criteria).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_from_answer() {
        assert!(Classification::from_answer("Ja.").matches);
        assert!(Classification::from_answer("  yes, it is").matches);
        assert!(!Classification::from_answer("Nein").matches);
        assert!(!Classification::from_answer("").matches);
        assert_eq!(Classification::from_answer("Nein!").label, "nein");
    }

    #[test]
    fn test_classification_request_is_short() {
        let request = CompletionRequest::classification("Mein Hund bellt", "Ist das Hundeverhalten?");
        assert_eq!(request.params.max_tokens, Some(3));
        assert!(request.prompt.starts_with("Ist das Hundeverhalten?"));
        assert!(request.prompt.ends_with("Mein Hund bellt"));
    }
}
