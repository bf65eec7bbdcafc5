// src/search/ingest.rs
//! Course sync into the vector collection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use super::weaviate::course_object_id;
use super::{EmbeddingGenerator, PropertyFilter, SearchResult, VectorSearchProvider};
use crate::page::PageContextCache;

/// Course record as delivered by the CMS sync
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseDocument {
    pub slug: String,
    pub course_title: String,
    pub fee: String,
    pub skills: String,
    pub category: String,
    pub hero_features: String,
    pub curriculum: String,
    pub course_description: String,
    pub faqs: String,
    pub prerequisites: String,
    pub target_audience: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CourseChange {
    Upsert(CourseDocument),
    Delete { slug: String },
}

impl CourseChange {
    pub fn slug(&self) -> &str {
        match self {
            CourseChange::Upsert(doc) => &doc.slug,
            CourseChange::Delete { slug } => slug,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Objects the provider matched while purging changed slugs
    pub purged: u64,
    pub indexed: usize,
    /// Slugs whose embedding or insert failed
    pub failed: Vec<String>,
}

/// Text the course vector is computed from
pub fn build_embedding_text(doc: &CourseDocument) -> String {
    [
        doc.course_title.clone(),
        format!(",Pricing is {},", doc.fee),
        format!(",Skills Gain : {},", doc.skills),
        format!("Category is {}", doc.category),
        doc.hero_features.clone(),
        doc.curriculum.clone(),
        doc.course_description.clone(),
        doc.faqs.clone(),
    ]
    .join(" ")
}

pub struct CourseIndexer {
    embedder: Arc<dyn EmbeddingGenerator>,
    provider: Arc<dyn VectorSearchProvider>,
    page_cache: Option<PageContextCache>,
}

impl CourseIndexer {
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>, provider: Arc<dyn VectorSearchProvider>) -> Self {
        Self {
            embedder,
            provider,
            page_cache: None,
        }
    }

    /// Also drop page-context entries of every changed slug
    pub fn with_page_cache(mut self, page_cache: PageContextCache) -> Self {
        self.page_cache = Some(page_cache);
        self
    }

    /// Replace the indexed state of every changed course.
    ///
    /// Purging fails the whole sync; a failure on one course is recorded in
    /// the report and the remaining courses are still indexed.
    pub async fn sync(&self, changes: &[CourseChange]) -> SearchResult<SyncReport> {
        let mut report = SyncReport::default();
        let slugs: Vec<String> = changes
            .iter()
            .map(|c| c.slug().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if slugs.is_empty() {
            return Ok(report);
        }

        info!(changes = changes.len(), "Syncing course embeddings");
        report.purged = self
            .provider
            .delete_many(&PropertyFilter::contains_any("slug", slugs.clone()))
            .await?;

        if let Some(page_cache) = &self.page_cache {
            for slug in &slugs {
                page_cache.invalidate(slug).await;
            }
        }

        for change in changes {
            let CourseChange::Upsert(doc) = change else {
                continue;
            };
            if doc.slug.is_empty() {
                warn!(title = %doc.course_title, "Skipping course without slug");
                continue;
            }
            match self.index(doc).await {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    error!(slug = %doc.slug, error = %e, "Course indexing failed");
                    report.failed.push(doc.slug.clone());
                }
            }
        }

        info!(
            purged = report.purged,
            indexed = report.indexed,
            failed = report.failed.len(),
            "Course sync complete"
        );
        Ok(report)
    }

    async fn index(&self, doc: &CourseDocument) -> SearchResult<()> {
        let text = build_embedding_text(doc);
        let vector = self.embedder.embed(&text).await?;
        let properties = json!({
            "embedding_text": text,
            "course_title": doc.course_title,
            "slug": doc.slug,
            "hero_features": doc.hero_features,
            "pricing": doc.fee,
            "skills": doc.skills,
            "prerequisites": doc.prerequisites,
            "target_audience": doc.target_audience,
            "duration": doc.duration,
            "category": doc.category,
        });
        self.provider
            .insert(course_object_id(&doc.slug), &vector, properties)
            .await
    }
}
