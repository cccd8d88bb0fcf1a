// tests/unit_invalidation_test.rs

use bytes::Bytes;
use restatic::core::invalidation::{
    InvalidationEvent, InvalidationResolver, PurgeSelector, Purger,
};
use restatic::core::keys::{CacheKey, VariantMap};
use restatic::core::store::{CacheStore, META_URL};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

async fn seeded_store(tmp: &TempDir, urls: &[&str]) -> Arc<CacheStore> {
    let store = Arc::new(CacheStore::new(tmp.path().join("cache"), 3600, true, None).unwrap());
    for url in urls {
        let key = CacheKey::derive(url, &VariantMap::new());
        let metadata = HashMap::from([(META_URL.to_string(), Value::from(*url))]);
        store
            .write(key.as_str(), Bytes::from(format!("<html>{url}</html>")), None, metadata)
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn pattern_purge_hits_only_matching_urls() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp, &["/blog/1", "/blog/2", "/about"]).await;
    let purger = Purger::new(store.clone());

    let report = purger
        .purge(&PurgeSelector::Pattern("/blog/*".to_string()))
        .await;
    assert_eq!(report.purged_count, 2);
    assert_eq!(report.keys_purged.len(), 2);
    assert!(report.errors.is_empty());

    let about_key = CacheKey::derive("/about", &VariantMap::new());
    assert!(store.read(about_key.as_str()).await.is_some());
    let blog_key = CacheKey::derive("/blog/1", &VariantMap::new());
    assert!(store.read(blog_key.as_str()).await.is_none());
}

#[tokio::test]
async fn purge_by_keys_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp, &["/only"]).await;
    let purger = Purger::new(store);

    let key = CacheKey::derive("/only", &VariantMap::new());
    let selector = PurgeSelector::Keys(vec![key.to_string()]);

    let first = purger.purge(&selector).await;
    assert_eq!(first.purged_count, 1);
    assert!(first.errors.is_empty());

    let second = purger.purge(&selector).await;
    assert_eq!(second.purged_count, 0);
    assert!(second.keys_purged.is_empty());
    assert!(second.errors.is_empty());
}

#[tokio::test]
async fn missing_keys_are_skipped_silently_but_invalid_keys_error() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp, &[]).await;
    let purger = Purger::new(store);

    let report = purger
        .purge(&PurgeSelector::Keys(vec![
            "never-written".to_string(),
            "".to_string(),
        ]))
        .await;
    assert_eq!(report.purged_count, 0);
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn entries_without_url_metadata_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::new(tmp.path().join("cache"), 3600, false, None).unwrap());
    store
        .write("anonymous", Bytes::from_static(b"x"), None, HashMap::new())
        .await
        .unwrap();
    let purger = Purger::new(store.clone());

    let report = purger.purge(&PurgeSelector::Pattern("*".to_string())).await;
    assert_eq!(report.purged_count, 0);
    assert!(report.errors.is_empty());
    assert!(store.read("anonymous").await.is_some());
}

#[tokio::test]
async fn purge_all_empties_the_store() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp, &["/a", "/b", "/c"]).await;
    let purger = Purger::new(store.clone());

    let report = purger.purge(&PurgeSelector::All).await;
    assert_eq!(report.purged_count, 3);
    assert!(store.list_keys().await.is_empty());
}

#[tokio::test]
async fn event_purges_entity_and_dependent_pages() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(
        &tmp,
        &["/post/42", "/category/tech", "/category/cooking", "/about"],
    )
    .await;
    let purger = Purger::new(store.clone());
    let resolver = InvalidationResolver::default();

    let event = InvalidationEvent {
        event: "updated".to_string(),
        entity_type: "post".to_string(),
        entity_id: "42".to_string(),
        dependencies: HashMap::from([(
            "category_page".to_string(),
            vec!["tech".to_string()],
        )]),
        variants: vec![],
    };

    let report = purger.purge_event(&resolver, &event).await;
    assert_eq!(report.purged_count, 2);

    let cooking = CacheKey::derive("/category/cooking", &VariantMap::new());
    assert!(store.read(cooking.as_str()).await.is_some());
    let about = CacheKey::derive("/about", &VariantMap::new());
    assert!(store.read(about.as_str()).await.is_some());
}

#[tokio::test]
async fn event_with_variants_purges_each_variant_entry() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::new(tmp.path().join("cache"), 3600, true, None).unwrap());

    let mut mobile = VariantMap::new();
    mobile.insert("device".to_string(), "mobile".to_string());

    for variants in [VariantMap::new(), mobile.clone()] {
        let key = CacheKey::derive("/post/7", &variants);
        store
            .write(key.as_str(), Bytes::from_static(b"v"), None, HashMap::new())
            .await
            .unwrap();
    }

    let purger = Purger::new(store.clone());
    let event = InvalidationEvent {
        event: "updated".to_string(),
        entity_type: "post".to_string(),
        entity_id: "7".to_string(),
        dependencies: HashMap::new(),
        variants: vec![mobile.clone()],
    };
    let report = purger
        .purge_event(&InvalidationResolver::default(), &event)
        .await;

    assert_eq!(report.purged_count, 2);
    assert!(store.read(CacheKey::derive("/post/7", &mobile).as_str()).await.is_none());
}
