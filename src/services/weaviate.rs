//! Weaviate adapter using the GraphQL `nearText` query

use super::search::{SearchHit, VectorSearch};
use super::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

pub struct WeaviateSearch {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    /// Properties fetched for each known collection
    collections: HashMap<String, Vec<String>>,
}

impl WeaviateSearch {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/graphql", base_url.trim_end_matches('/')),
            api_key,
            collections: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_collection(mut self, name: impl Into<String>, properties: &[&str]) -> Self {
        self.collections.insert(
            name.into(),
            properties.iter().map(ToString::to_string).collect(),
        );
        self
    }

    fn build_query(collection: &str, properties: &[String], query: &str, limit: usize) -> String {
        // JSON string escaping is valid GraphQL string escaping
        let concepts = Value::String(query.to_string());
        format!(
            "{{ Get {{ {collection}(nearText: {{concepts: [{concepts}]}}, limit: {limit}) {{ {} _additional {{ distance }} }} }} }}",
            properties.join(" ")
        )
    }

    #[allow(clippy::cast_possible_truncation)] // distances are in [0, 2]
    fn parse_hits(collection: &str, body: &Value) -> Result<Vec<SearchHit>, ServiceError> {
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ServiceError::invalid_request(format!("GraphQL error: {message}")));
            }
        }

        let Some(items) = body
            .pointer(&format!("/data/Get/{collection}"))
            .and_then(Value::as_array)
        else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = items
            .iter()
            .filter_map(Value::as_object)
            .map(|item| {
                let distance = item
                    .get("_additional")
                    .and_then(|a| a.get("distance"))
                    .and_then(Value::as_f64)
                    .map_or(1.0, |d| d as f32);
                let properties: Map<String, Value> = item
                    .iter()
                    .filter(|(k, _)| k.as_str() != "_additional")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                SearchHit {
                    properties,
                    distance,
                }
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }
}

#[async_trait]
impl VectorSearch for WeaviateSearch {
    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let properties = self.collections.get(collection).ok_or_else(|| {
            ServiceError::invalid_request(format!("Unknown collection: {collection}"))
        })?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": Self::build_query(collection, properties, query, limit) }));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::network(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(ServiceError::from_status(status.as_u16(), &text));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| ServiceError::unknown(format!("Failed to parse response: {e}")))?;
        Self::parse_hits(collection, &body)
    }
}
