// src/search/similarity.rs
//! Cache-aside similarity search with two independent tiers.
//!
//! Both tiers are keyed by the normalized query:
//! - `emb:{q}` the query embedding (long TTL, expensive to recompute)
//! - `weaviate:similarity:{q}` the ranked provider result (shorter TTL)
//!
//! A result hit returns without touching the embedder or the provider. On a
//! miss the embedding tier is consulted first, then the provider is queried
//! with the original query text. Nothing is written unless the provider
//! call succeeds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::{Embedding, EmbeddingGenerator, ScoredMatch, SearchResult, VectorSearchProvider};
use crate::cache::keys::{embedding_key, normalize_query, similarity_key};
use crate::cache::{get_json, set_json, CacheStore};
use crate::monitoring::metrics::{record_cache_error, record_cache_hit, record_cache_miss};

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityConfig {
    pub embedding_ttl: Duration,
    pub result_ttl: Duration,
    /// Maximum candidates requested from the provider
    pub limit: usize,
    /// Weight of the vector score in the hybrid ranking
    pub alpha: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            embedding_ttl: Duration::from_secs(3600),
            result_ttl: Duration::from_secs(1800),
            limit: 12,
            alpha: 0.6,
        }
    }
}

pub struct SimilaritySearch {
    cache: Arc<dyn CacheStore>,
    embedder: Arc<dyn EmbeddingGenerator>,
    provider: Arc<dyn VectorSearchProvider>,
    config: SimilarityConfig,
}

impl SimilaritySearch {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        embedder: Arc<dyn EmbeddingGenerator>,
        provider: Arc<dyn VectorSearchProvider>,
        config: SimilarityConfig,
    ) -> Self {
        Self {
            cache,
            embedder,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Courses similar to `query`, served from cache when possible.
    pub async fn resolve_similar(&self, query: &str) -> SearchResult<Vec<ScoredMatch>> {
        let normalized = normalize_query(query);
        let result_key = similarity_key(&normalized);

        if let Some(cached) = self.read::<Vec<ScoredMatch>>(&result_key).await {
            record_cache_hit("result");
            debug!(key = %result_key, matches = cached.len(), "Similarity cache hit");
            return Ok(cached);
        }
        record_cache_miss("result");

        let emb_key = embedding_key(&normalized);
        let (vector, fresh_embedding) = match self.read::<Embedding>(&emb_key).await {
            Some(vector) => {
                record_cache_hit("embedding");
                (vector, false)
            }
            None => {
                record_cache_miss("embedding");
                (self.embedder.embed(query).await?, true)
            }
        };

        let started = Instant::now();
        let matches = self
            .provider
            .hybrid_query(query, &vector, self.config.limit, self.config.alpha)
            .await?;
        info!(
            key = %result_key,
            matches = matches.len(),
            fresh_embedding,
            duration_ms = started.elapsed().as_millis() as u64,
            "Similarity computed by provider"
        );

        if fresh_embedding {
            self.write(&emb_key, &vector, self.config.embedding_ttl).await;
        }
        self.write(&result_key, &matches, self.config.result_ttl).await;

        Ok(matches)
    }

    /// Cache read that treats failures as a miss
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match get_json(self.cache.as_ref(), key).await {
            Ok(value) => value,
            Err(e) => {
                record_cache_error("read");
                warn!(key, error = %e, "Cache read failed, using provider");
                None
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = set_json(self.cache.as_ref(), key, value, ttl).await {
            record_cache_error("write");
            warn!(key, error = %e, "Cache write failed");
        }
    }
}
