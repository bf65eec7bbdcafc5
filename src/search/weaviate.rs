// src/search/weaviate.rs
//! Weaviate REST/GraphQL client for the course collection.
//!
//! Objects are written with client-supplied vectors, so the collection needs
//! no vectorizer module. Object ids are derived from the course slug, which
//! makes re-ingesting a course overwrite rather than duplicate it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{http_client, PropertyFilter, ScoredMatch, SearchError, SearchResult, VectorSearchProvider};

/// Properties returned by hybrid queries
pub const RETURN_PROPERTIES: &[&str] = &[
    "course_title",
    "slug",
    "category",
    "skills",
    "prerequisites",
    "hero_features",
    "target_audience",
    "duration",
    "pricing",
];

#[derive(Debug, Clone)]
pub struct WeaviateConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout: Duration,
}

impl WeaviateConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            collection: "course_embeddings".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Deterministic object id for a course slug
pub fn course_object_id(slug: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, slug.as_bytes())
}

/// Weaviate capitalises the first letter of every class name
pub fn class_name(collection: &str) -> String {
    let mut chars = collection.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct WeaviateProvider {
    config: WeaviateConfig,
    class: String,
    client: reqwest::Client,
}

impl WeaviateProvider {
    pub fn new(config: WeaviateConfig) -> SearchResult<Self> {
        let client = http_client(config.timeout)?;
        let class = class_name(&config.collection);
        info!(base_url = %config.base_url, class = %class, "Weaviate provider configured");
        Ok(Self { config, class, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> SearchResult<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| SearchError::Provider(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Provider(format!("{}: {}", status, body)));
        }
        response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))
    }

    fn hybrid_graphql(&self, text: &str, vector: &[f32], limit: usize, alpha: f32) -> SearchResult<String> {
        Ok(format!(
            "{{ Get {{ {class}(hybrid: {{query: {query}, vector: {vector}, alpha: {alpha}}}, limit: {limit}) {{ {props} _additional {{ score }} }} }} }}",
            class = self.class,
            query = serde_json::to_string(text)?,
            vector = serde_json::to_string(vector)?,
            alpha = alpha,
            limit = limit,
            props = RETURN_PROPERTIES.join(" "),
        ))
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// Turn `data.Get.{class}` objects into ranked matches
fn parse_hybrid(class: &str, response: GraphQlResponse) -> SearchResult<Vec<ScoredMatch>> {
    if let Some(err) = response.errors.first() {
        return Err(SearchError::Provider(err.message.clone()));
    }
    let objects = response
        .data
        .as_ref()
        .and_then(|d| d.get("Get"))
        .and_then(|g| g.get(class))
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::InvalidResponse(format!("missing Get.{}", class)))?;

    Ok(objects
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            let mut details: Map<String, Value> = obj.clone();
            let score = details
                .remove("_additional")
                .and_then(|extra| extra.get("score").cloned())
                .and_then(|s| match s {
                    Value::String(raw) => raw.parse::<f32>().ok(),
                    Value::Number(n) => n.as_f64().map(|f| f as f32),
                    _ => None,
                });
            ScoredMatch {
                course_details: details,
                score,
            }
        })
        .collect())
}

#[async_trait]
impl VectorSearchProvider for WeaviateProvider {
    async fn insert(&self, id: Uuid, vector: &[f32], properties: Value) -> SearchResult<()> {
        let body = json!({
            "class": self.class,
            "id": id,
            "properties": properties,
            "vector": vector,
        });
        self.send(self.request(reqwest::Method::POST, "/v1/objects").json(&body))
            .await?;
        debug!(%id, class = %self.class, "Inserted object");
        Ok(())
    }

    async fn delete_many(&self, filter: &PropertyFilter) -> SearchResult<u64> {
        if filter.values.is_empty() {
            return Ok(0);
        }
        let body = json!({
            "match": {
                "class": self.class,
                "where": {
                    "path": [filter.property],
                    "operator": "ContainsAny",
                    "valueTextArray": filter.values,
                }
            },
            "output": "minimal",
        });
        let response = self
            .send(self.request(reqwest::Method::DELETE, "/v1/batch/objects").json(&body))
            .await?;
        let matched = response
            .pointer("/results/matches")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        info!(requested = filter.values.len(), matched, "Deleted objects by {}", filter.property);
        Ok(matched)
    }

    async fn hybrid_query(
        &self,
        text: &str,
        vector: &[f32],
        limit: usize,
        alpha: f32,
    ) -> SearchResult<Vec<ScoredMatch>> {
        let query = self.hybrid_graphql(text, vector, limit, alpha)?;
        let raw = self
            .send(self.request(reqwest::Method::POST, "/v1/graphql").json(&json!({ "query": query })))
            .await?;
        let response: GraphQlResponse = serde_json::from_value(raw)?;
        let matches = parse_hybrid(&self.class, response).inspect_err(|e| {
            warn!(error = %e, "Hybrid query failed");
        })?;
        debug!(limit, alpha, matches = matches.len(), "Hybrid query complete");
        Ok(matches)
    }
}
