//! Vector search collaborator

use super::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One search result. Lower distance means a closer match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub properties: Map<String, Value>,
    pub distance: f32,
}

impl SearchHit {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }
}

/// Semantic search over a named collection
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `limit` hits ordered by ascending distance. An empty result is
    /// not an error.
    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ServiceError>;
}

#[async_trait]
impl<T: VectorSearch + ?Sized> VectorSearch for Arc<T> {
    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        (**self).search(collection, query, limit).await
    }
}
