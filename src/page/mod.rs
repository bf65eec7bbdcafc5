// src/page/mod.rs
//! Page-context cache.
//!
//! Course metadata is cached per slug under `page:course:{slug}` as a JSON
//! envelope `{slug, data, source, updated_at}`. `source` is provenance only;
//! reads ignore it. A cache failure never fails a resolve: the document store
//! is consulted instead.

pub mod url;

pub use url::{extract_page_info, PageInfo};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::keys::{navigation_key, page_key};
use crate::cache::{get_json, set_json, CacheError, CacheStore};
use crate::monitoring::metrics::{record_cache_error, record_cache_hit, record_cache_miss};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("document store error: {0}")]
    DocumentStore(String),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PageResult<T> = Result<T, PageError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageCacheConfig {
    pub ttl: Duration,
    /// Lifetime of a session's last-visited page
    pub navigation_ttl: Duration,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            navigation_ttl: Duration::from_secs(1800),
        }
    }
}

/// Source of course records on a cache miss
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> PageResult<Option<Value>>;
}

/// Slug-indexed records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    records: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, slug: impl Into<String>, record: Value) {
        self.records.write().insert(slug.into(), record);
    }

    pub fn remove(&self, slug: &str) -> Option<Value> {
        self.records.write().remove(slug)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_by_slug(&self, slug: &str) -> PageResult<Option<Value>> {
        Ok(self.records.read().get(slug).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope {
    pub slug: String,
    pub data: Value,
    pub source: String,
    /// Unix seconds
    pub updated_at: i64,
}

impl PageEnvelope {
    fn new(slug: &str, data: Value, source: &str) -> Self {
        Self {
            slug: slug.to_string(),
            data,
            source: source.to_string(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    Cache,
    Db,
}

impl PageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSource::Cache => "cache",
            PageSource::Db => "db",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPage {
    pub data: Value,
    pub source: PageSource,
}

/// Last page a session was seen on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRecord {
    pub last_url: String,
    pub slug: Option<String>,
    pub updated_at: i64,
}

#[derive(Clone)]
pub struct PageContextCache {
    cache: Arc<dyn CacheStore>,
    documents: Arc<dyn DocumentStore>,
    config: PageCacheConfig,
}

impl PageContextCache {
    pub fn new(cache: Arc<dyn CacheStore>, documents: Arc<dyn DocumentStore>, config: PageCacheConfig) -> Self {
        Self {
            cache,
            documents,
            config,
        }
    }

    /// Course data for `slug`, or `None` if the document store has no record.
    pub async fn resolve_by_slug(&self, slug: &str) -> PageResult<Option<ResolvedPage>> {
        let key = page_key(slug);

        match get_json::<PageEnvelope>(self.cache.as_ref(), &key).await {
            Ok(Some(envelope)) => {
                record_cache_hit("page");
                debug!(slug, source = %envelope.source, "Page cache hit");
                return Ok(Some(ResolvedPage {
                    data: envelope.data,
                    source: PageSource::Cache,
                }));
            }
            Ok(None) => record_cache_miss("page"),
            Err(e) => {
                record_cache_error("read");
                warn!(slug, error = %e, "Page cache read failed, using document store");
            }
        }

        let Some(data) = self.documents.find_by_slug(slug).await? else {
            debug!(slug, "No page data for slug");
            return Ok(None);
        };

        let envelope = PageEnvelope::new(slug, data, PageSource::Db.as_str());
        if let Err(e) = set_json(self.cache.as_ref(), &key, &envelope, self.config.ttl).await {
            record_cache_error("write");
            warn!(slug, error = %e, "Page cache write failed");
        }

        Ok(Some(ResolvedPage {
            data: envelope.data,
            source: PageSource::Db,
        }))
    }

    /// Push externally supplied data into the cache, skipping the document
    /// store. `source` defaults to `api_call`.
    pub async fn prewarm(&self, slug: &str, data: Value, source: Option<&str>) -> PageResult<()> {
        let envelope = PageEnvelope::new(slug, data, source.unwrap_or("api_call"));
        set_json(self.cache.as_ref(), &page_key(slug), &envelope, self.config.ttl).await?;
        info!(slug, source = %envelope.source, "Page cache prewarmed");
        Ok(())
    }

    pub async fn invalidate(&self, slug: &str) {
        if let Err(e) = self.cache.delete(&page_key(slug)).await {
            record_cache_error("delete");
            warn!(slug, error = %e, "Page cache invalidation failed");
        }
    }

    /// Remember where the session's visitor currently is.
    pub async fn record_navigation(&self, session_id: &str, url: &str, slug: Option<&str>) -> PageResult<()> {
        let record = NavigationRecord {
            last_url: url.to_string(),
            slug: slug.map(str::to_string),
            updated_at: chrono::Utc::now().timestamp(),
        };
        set_json(
            self.cache.as_ref(),
            &navigation_key(session_id),
            &record,
            self.config.navigation_ttl,
        )
        .await?;
        Ok(())
    }

    pub async fn last_navigation(&self, session_id: &str) -> PageResult<Option<NavigationRecord>> {
        Ok(get_json(self.cache.as_ref(), &navigation_key(session_id)).await?)
    }
}
