use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use presales_core::cache::{CacheStore, MemoryCacheStore};
use presales_core::page::{
    extract_page_info, DocumentStore, PageCacheConfig, PageContextCache, PageEnvelope, PageError, PageResult,
    PageSource,
};
use serde_json::{json, Value};

#[derive(Default)]
struct CountingDocuments {
    lookups: AtomicUsize,
}

#[async_trait]
impl DocumentStore for CountingDocuments {
    async fn find_by_slug(&self, slug: &str) -> PageResult<Option<Value>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match slug {
            "intro-to-python" => Ok(Some(json!({"course_title": "Intro to Python", "fee": "$99"}))),
            "broken" => Err(PageError::DocumentStore("mongo unavailable".into())),
            _ => Ok(None),
        }
    }
}

fn setup() -> (MemoryCacheStore, Arc<CountingDocuments>, PageContextCache) {
    let store = MemoryCacheStore::new();
    let docs = Arc::new(CountingDocuments::default());
    let pages = PageContextCache::new(Arc::new(store.clone()), docs.clone(), PageCacheConfig::default());
    (store, docs, pages)
}

#[tokio::test(start_paused = true)]
async fn first_resolve_hits_db_then_cache() {
    let (_store, docs, pages) = setup();

    let first = pages.resolve_by_slug("intro-to-python").await.unwrap().unwrap();
    assert_eq!(first.source, PageSource::Db);

    let second = pages.resolve_by_slug("intro-to-python").await.unwrap().unwrap();
    assert_eq!(second.source, PageSource::Cache);
    assert_eq!(second.data, first.data);
    assert_eq!(docs.lookups.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(3601)).await;
    let third = pages.resolve_by_slug("intro-to-python").await.unwrap().unwrap();
    assert_eq!(third.source, PageSource::Db);
    assert_eq!(docs.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn absent_slug_is_not_cached() {
    let (store, docs, pages) = setup();

    assert!(pages.resolve_by_slug("no-such-course").await.unwrap().is_none());
    assert!(pages.resolve_by_slug("no-such-course").await.unwrap().is_none());
    assert_eq!(docs.lookups.load(Ordering::SeqCst), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn document_store_errors_propagate() {
    let (_store, _docs, pages) = setup();
    let err = pages.resolve_by_slug("broken").await.unwrap_err();
    assert!(matches!(err, PageError::DocumentStore(_)));
}

#[tokio::test]
async fn prewarm_bypasses_document_store() {
    let (store, docs, pages) = setup();

    pages
        .prewarm("new-course", json!({"course_title": "New"}), Some("cms_sync"))
        .await
        .unwrap();

    let resolved = pages.resolve_by_slug("new-course").await.unwrap().unwrap();
    assert_eq!(resolved.source, PageSource::Cache);
    assert_eq!(resolved.data["course_title"], "New");
    assert_eq!(docs.lookups.load(Ordering::SeqCst), 0);

    let raw = store.get("page:course:new-course").await.unwrap().unwrap();
    let envelope: PageEnvelope = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope.source, "cms_sync");

    pages.prewarm("other", json!({}), None).await.unwrap();
    let raw = store.get("page:course:other").await.unwrap().unwrap();
    assert_eq!(serde_json::from_str::<PageEnvelope>(&raw).unwrap().source, "api_call");
}

#[tokio::test]
async fn visitor_url_drives_page_lookup() {
    let (_store, _docs, pages) = setup();
    let info = extract_page_info("https://academy.example.com/courses/intro-to-python");
    let slug = info.slug().unwrap();

    pages
        .record_navigation("s1", "https://academy.example.com/courses/intro-to-python", Some(slug))
        .await
        .unwrap();
    let nav = pages.last_navigation("s1").await.unwrap().unwrap();
    assert_eq!(nav.slug.as_deref(), Some("intro-to-python"));

    let page = pages.resolve_by_slug(slug).await.unwrap().unwrap();
    assert_eq!(page.data["fee"], "$99");
}
