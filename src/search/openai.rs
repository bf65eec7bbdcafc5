// src/search/openai.rs
// Query embeddings from the OpenAI embeddings endpoint

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, Embedding, EmbeddingGenerator, SearchError, SearchResult};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig) -> SearchResult<Self> {
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingGenerator for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> SearchResult<Embedding> {
        debug!(model = %self.config.model, text_len = text.len(), "Requesting embedding");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&EmbeddingRequest {
                input: text,
                model: &self.config.model,
                encoding_format: "float",
            })
            .send()
            .await
            .map_err(|e| SearchError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Embedding(format!("{}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SearchError::InvalidResponse("no embedding in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let config = OpenAiConfig::new("sk-test");
        assert_eq!(config.model, "text-embedding-3-small");
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        let mut config = OpenAiConfig::new("sk-test");
        config.base_url = "http://localhost:9000/v1/".to_string();
        let embedder = OpenAiEmbedder::new(config).unwrap();
        assert_eq!(embedder.endpoint(), "http://localhost:9000/v1/embeddings");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"object":"list","data":[{"index":0,"embedding":[0.1,-0.2]}]}"#).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, -0.2]);
    }
}
