// src/config.rs
//! Environment configuration.
//!
//! `AppConfig::from_env()` loads `.env` (unless `NO_DOTENV` is set) and reads:
//! - DEV_MODE: `True` selects the embedded SQLite store, otherwise Postgres
//! - SQLITE_PATH, DATABASE_URL (or SQLALCHEMY_URL), DB_POOL_SIZE, DB_MAX_OVERFLOW
//! - REDIS_URL, or REDIS_HOST / REDIS_PORT / REDIS_USERNAME / REDIS_PASSWORD
//! - LOCK_TIMEOUT, BLOCKING_TIMEOUT (seconds, fractional allowed)
//! - EMBEDDING_CACHE_TTL, SIMILARITY_CACHE_TTL, PAGE_CACHE_TTL, NAV_TTL (seconds)
//! - WEAVIATE_HOST, WEAVIATE_PORT, WEAVIATE_API_KEY, COLLECTION_NAME
//! - OPENAI_API_KEY, OPENAI_BASE_URL, EMBEDDING_MODEL

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::lock::LockConfig;
use crate::monitoring::MonitoringConfig;
use crate::page::PageCacheConfig;
use crate::search::openai::OpenAiConfig;
use crate::search::similarity::SimilarityConfig;
use crate::search::weaviate::WeaviateConfig;
use crate::session::postgres::PostgresConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which durable session store to use
#[derive(Debug, Clone)]
pub enum SessionStoreConfig {
    /// Single-file SQLite database (development)
    Embedded { path: PathBuf },
    /// Pooled Postgres (production)
    Networked(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub session_store: SessionStoreConfig,
    pub redis_url: String,
    pub lock: LockConfig,
    pub similarity: SimilarityConfig,
    pub page: PageCacheConfig,
    pub weaviate: WeaviateConfig,
    /// `None` when no API key is configured
    pub embeddings: Option<OpenAiConfig>,
    pub monitoring: MonitoringConfig,
}

impl AppConfig {
    pub fn from_env() -> ConfigResult<Self> {
        if std::env::var("NO_DOTENV").is_err() {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let session_store = if env.flag("DEV_MODE") {
            SessionStoreConfig::Embedded {
                path: PathBuf::from(env.get("SQLITE_PATH").unwrap_or_else(|| "agents_history.db".to_string())),
            }
        } else {
            let url = env
                .get("DATABASE_URL")
                .or_else(|| env.get("SQLALCHEMY_URL"))
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let mut pg = PostgresConfig::new(url);
            pg.pool_size = env.parse("DB_POOL_SIZE", pg.pool_size)?;
            pg.max_overflow = env.parse("DB_MAX_OVERFLOW", pg.max_overflow)?;
            SessionStoreConfig::Networked(pg)
        };

        let lock_defaults = LockConfig::default();
        let lock = LockConfig {
            lease_timeout: env.secs("LOCK_TIMEOUT", lock_defaults.lease_timeout)?,
            wait_timeout: env.secs("BLOCKING_TIMEOUT", lock_defaults.wait_timeout)?,
        };
        if lock.lease_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "LOCK_TIMEOUT",
                value: env.get("LOCK_TIMEOUT").unwrap_or_default(),
            });
        }

        let mut similarity = SimilarityConfig::default();
        similarity.embedding_ttl = env.secs("EMBEDDING_CACHE_TTL", similarity.embedding_ttl)?;
        similarity.result_ttl = env.secs("SIMILARITY_CACHE_TTL", similarity.result_ttl)?;

        let mut page = PageCacheConfig::default();
        page.ttl = env.secs("PAGE_CACHE_TTL", page.ttl)?;
        page.navigation_ttl = env.secs("NAV_TTL", page.navigation_ttl)?;

        let weaviate_host = env.get("WEAVIATE_HOST").unwrap_or_else(|| "localhost".to_string());
        let weaviate_port: u16 = env.parse("WEAVIATE_PORT", 8080)?;
        let mut weaviate = WeaviateConfig::new(format!("http://{}:{}", weaviate_host, weaviate_port));
        weaviate.api_key = env.get("WEAVIATE_API_KEY");
        if let Some(collection) = env.get("COLLECTION_NAME") {
            weaviate.collection = collection;
        }

        let embeddings = env.get("OPENAI_API_KEY").map(|api_key| {
            let mut cfg = OpenAiConfig::new(api_key);
            if let Some(model) = env.get("EMBEDDING_MODEL") {
                cfg.model = model;
            }
            if let Some(base_url) = env.get("OPENAI_BASE_URL") {
                cfg.base_url = base_url;
            }
            cfg
        });

        Ok(Self {
            session_store,
            redis_url: redis_url(&env)?,
            lock,
            similarity,
            page,
            weaviate,
            embeddings,
            monitoring: MonitoringConfig::from_lookup(&env.lookup),
        })
    }

    pub fn is_dev_mode(&self) -> bool {
        matches!(self.session_store, SessionStoreConfig::Embedded { .. })
    }
}

fn redis_url<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> ConfigResult<String> {
    if let Some(url) = env.get("REDIS_URL") {
        return Ok(url);
    }
    let host = env.get("REDIS_HOST").unwrap_or_else(|| "localhost".to_string());
    let port: u16 = env.parse("REDIS_PORT", 6379)?;
    let username = env.get("REDIS_USERNAME").unwrap_or_else(|| "default".to_string());

    Ok(match env.get("REDIS_PASSWORD") {
        Some(password) => format!("redis://{}:{}@{}:{}/", username, password, host, port),
        None => format!("redis://{}:{}/", host, port),
    })
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> ConfigResult<T> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw }),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &'static str, default: Duration) -> ConfigResult<Duration> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or(ConfigError::Invalid { key, value: raw }),
            None => Ok(default),
        }
    }
}
