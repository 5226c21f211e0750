//! `OpenAI`-compatible chat completions adapter

use super::text::{CompletionRequest, TextGenerator};
use super::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiTextGenerator {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    /// Used when a request leaves temperature at the default
    temperature: f32,
}

impl OpenAiTextGenerator {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<&str>,
        temperature: f32,
        request_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let endpoint = format!(
            "{}/chat/completions",
            base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
        );
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint,
            temperature,
        })
    }

    fn translate_request(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let default_temperature = super::GenerationParams::default().temperature;
        let temperature = if (request.params.temperature - default_temperature).abs() < f32::EPSILON {
            self.temperature
        } else {
            request.params.temperature
        };

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: request.params.max_tokens,
        }
    }

    fn normalize_response(resp: ChatResponse) -> Result<String, ServiceError> {
        resp.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ServiceError::unknown("Response contained no message content"))
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map_or(text, |err| err.error.message);
            return Err(ServiceError::from_status(status.as_u16(), &message));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ServiceError::unknown(format!("Failed to parse response: {e}")))?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
