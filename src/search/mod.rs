// src/search/mod.rs
//! Semantic course search.
//!
//! The embedding model and the vector database are external collaborators
//! behind [`EmbeddingGenerator`] and [`VectorSearchProvider`];
//! [`similarity::SimilaritySearch`] puts the two-tier cache in front of them.

pub mod ingest;
pub mod openai;
pub mod similarity;
pub mod weaviate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector provider failed: {0}")]
    Provider(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SearchResult<T> = Result<T, SearchError>;

pub type Embedding = Vec<f32>;

/// One ranked hit from a hybrid query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub course_details: Map<String, Value>,
    pub score: Option<f32>,
}

impl ScoredMatch {
    pub fn slug(&self) -> Option<&str> {
        self.course_details.get("slug").and_then(Value::as_str)
    }
}

/// Match objects whose `property` equals any of `values`
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub property: String,
    pub values: Vec<String>,
}

impl PropertyFilter {
    pub fn contains_any(property: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            property: property.into(),
            values,
        }
    }
}

/// Text embedding model
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    async fn embed(&self, text: &str) -> SearchResult<Embedding>;
}

/// Vector database holding the course collection
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    async fn insert(&self, id: Uuid, vector: &[f32], properties: Value) -> SearchResult<()>;

    /// Returns the number of objects matched for deletion
    async fn delete_many(&self, filter: &PropertyFilter) -> SearchResult<u64>;

    /// Lexical + vector ranking; `alpha` weights the vector score.
    async fn hybrid_query(
        &self,
        text: &str,
        vector: &[f32],
        limit: usize,
        alpha: f32,
    ) -> SearchResult<Vec<ScoredMatch>>;
}

/// Pooled HTTP client shared by the provider clients
pub(crate) fn http_client(timeout: std::time::Duration) -> SearchResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(timeout)
        .build()?)
}
