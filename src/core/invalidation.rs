// src/core/invalidation.rs

//! Invalidation: mapping domain events to cache keys, and purging.
//!
//! A domain event ("post 42 was updated") names the entity that changed
//! plus the dependent page classes affected through tags. The resolver
//! composes the canonical URL for each affected page and derives its
//! fingerprint per variant; the purger then deletes by explicit key
//! list, by URL glob over persisted `metadata.url`, or wholesale.

use crate::core::errors::RestaticError;
use crate::core::keys::{CacheKey, VariantMap};
use crate::core::store::CacheStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use wildmatch::WildMatchPattern;

/// URL glob where `*` is the sole wildcard; `?` is a literal character.
type UrlPattern = WildMatchPattern<'*', '\0'>;

/// A domain change notification from the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Event verb, e.g. `updated` or `deleted`. Free-form.
    pub event: String,
    pub entity_type: String,
    pub entity_id: String,
    /// Dependent page classes and the tags of theirs that are affected,
    /// e.g. `category_page: [tech, programming]`. May be empty.
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    /// Variant maps the affected pages were cached under. The bare
    /// (variant-free) representation is always included implicitly.
    #[serde(default)]
    pub variants: Vec<VariantMap>,
}

/// The keys an event resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub cache_keys_to_purge: BTreeSet<CacheKey>,
    pub reason: String,
}

/// Maps page classes to canonical URLs and derives the fingerprints to
/// purge. The URL table uses `{slug}` as the placeholder for the entity
/// id or dependency tag.
#[derive(Debug, Clone)]
pub struct InvalidationResolver {
    url_templates: HashMap<String, String>,
}

impl Default for InvalidationResolver {
    /// The built-in page-class table for a typical content site.
    fn default() -> Self {
        let mut url_templates = HashMap::new();
        for (class, template) in [
            ("post", "/post/{slug}"),
            ("page", "/{slug}"),
            ("category_page", "/category/{slug}"),
            ("tag_page", "/tag/{slug}"),
            ("author_page", "/author/{slug}"),
            ("archive_page", "/archive/{slug}"),
        ] {
            url_templates.insert(class.to_string(), template.to_string());
        }
        Self { url_templates }
    }
}

impl InvalidationResolver {
    pub fn new(url_templates: HashMap<String, String>) -> Self {
        Self { url_templates }
    }

    /// Composes the URL for a page class and slug, when the class is
    /// known.
    fn url_for(&self, page_class: &str, slug: &str) -> Option<String> {
        self.url_templates
            .get(page_class)
            .map(|template| template.replace("{slug}", slug))
    }

    /// Resolves an event to the full set of fingerprints to purge:
    /// the changed entity's own page plus every `(page_class, tag)`
    /// dependency, each crossed with the event's variant maps.
    pub fn resolve(&self, event: &InvalidationEvent) -> Resolution {
        let mut urls = Vec::new();

        match self.url_for(&event.entity_type, &event.entity_id) {
            Some(url) => urls.push(url),
            None => warn!(
                "No URL template for entity type '{}'; skipping its own page.",
                event.entity_type
            ),
        }

        for (page_class, tags) in &event.dependencies {
            let Some(template) = self.url_templates.get(page_class) else {
                warn!("No URL template for page class '{page_class}'; skipping.");
                continue;
            };
            for tag in tags {
                urls.push(template.replace("{slug}", tag));
            }
        }

        let bare = VariantMap::new();
        let mut variant_maps: Vec<&VariantMap> = vec![&bare];
        variant_maps.extend(event.variants.iter());

        let cache_keys_to_purge = urls
            .iter()
            .flat_map(|url| {
                variant_maps
                    .iter()
                    .map(|variants| CacheKey::derive(url, variants))
            })
            .collect();

        Resolution {
            cache_keys_to_purge,
            reason: format!(
                "{} {}:{}",
                event.event, event.entity_type, event.entity_id
            ),
        }
    }
}

/// How a purge selects its victims.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeSelector {
    /// Explicit storage keys. Missing keys are skipped silently.
    Keys(Vec<String>),
    /// Glob over each entry's `metadata.url`. Entries without a `url`
    /// are skipped silently.
    Pattern(String),
    /// Everything.
    All,
}

/// Outcome of one purge call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub purged_count: usize,
    pub keys_purged: Vec<String>,
    pub errors: Vec<String>,
}

/// Deletes cache entries selected by key, URL pattern, or wholesale.
pub struct Purger {
    store: Arc<CacheStore>,
}

impl Purger {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub async fn purge(&self, selector: &PurgeSelector) -> PurgeReport {
        match selector {
            PurgeSelector::Keys(keys) => self.purge_keys(keys).await,
            PurgeSelector::Pattern(pattern) => self.purge_pattern(pattern).await,
            PurgeSelector::All => {
                let keys = self.store.list_keys().await;
                self.purge_keys(&keys).await
            }
        }
    }

    /// Resolves an event and purges the result in one step.
    pub async fn purge_event(
        &self,
        resolver: &InvalidationResolver,
        event: &InvalidationEvent,
    ) -> PurgeReport {
        let resolution = resolver.resolve(event);
        debug!(
            "Invalidation '{}' resolved to {} cache keys.",
            resolution.reason,
            resolution.cache_keys_to_purge.len()
        );
        let keys: Vec<String> = resolution
            .cache_keys_to_purge
            .into_iter()
            .map(String::from)
            .collect();
        self.purge_keys(&keys).await
    }

    async fn purge_keys(&self, keys: &[String]) -> PurgeReport {
        let mut report = PurgeReport::default();
        for key in keys {
            if key.is_empty() {
                report.errors.push("empty cache key".to_string());
                continue;
            }
            if self.store.delete(key).await {
                report.purged_count += 1;
                report.keys_purged.push(key.clone());
            }
        }
        report
    }

    async fn purge_pattern(&self, pattern: &str) -> PurgeReport {
        let mut report = PurgeReport::default();
        if pattern.is_empty() {
            report.errors.push("empty purge pattern".to_string());
            return report;
        }
        let matcher = UrlPattern::new(pattern);

        for (key, entry) in self.store.list_entries().await {
            let Some(url) = entry.url() else {
                continue;
            };
            if matcher.matches(url) && self.store.delete(&key).await {
                report.purged_count += 1;
                report.keys_purged.push(key);
            }
        }
        report.keys_purged.sort();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_covers_entity_and_dependencies() {
        let resolver = InvalidationResolver::default();
        let event = InvalidationEvent {
            event: "updated".to_string(),
            entity_type: "post".to_string(),
            entity_id: "42".to_string(),
            dependencies: HashMap::from([(
                "category_page".to_string(),
                vec!["tech".to_string(), "programming".to_string()],
            )]),
            variants: vec![],
        };

        let resolution = resolver.resolve(&event);
        let expected: BTreeSet<CacheKey> = [
            CacheKey::derive("/post/42", &VariantMap::new()),
            CacheKey::derive("/category/tech", &VariantMap::new()),
            CacheKey::derive("/category/programming", &VariantMap::new()),
        ]
        .into_iter()
        .collect();
        assert_eq!(resolution.cache_keys_to_purge, expected);
        assert_eq!(resolution.reason, "updated post:42");
    }

    #[test]
    fn resolver_crosses_variants() {
        let resolver = InvalidationResolver::default();
        let mut mobile = VariantMap::new();
        mobile.insert("device".to_string(), "mobile".to_string());
        let event = InvalidationEvent {
            event: "updated".to_string(),
            entity_type: "post".to_string(),
            entity_id: "1".to_string(),
            dependencies: HashMap::new(),
            variants: vec![mobile.clone()],
        };

        let resolution = resolver.resolve(&event);
        assert!(resolution
            .cache_keys_to_purge
            .contains(&CacheKey::derive("/post/1", &VariantMap::new())));
        assert!(resolution
            .cache_keys_to_purge
            .contains(&CacheKey::derive("/post/1", &mobile)));
        assert_eq!(resolution.cache_keys_to_purge.len(), 2);
    }

    #[test]
    fn empty_dependencies_is_valid() {
        let resolver = InvalidationResolver::default();
        let event = InvalidationEvent {
            event: "deleted".to_string(),
            entity_type: "page".to_string(),
            entity_id: "about".to_string(),
            dependencies: HashMap::new(),
            variants: vec![],
        };
        let resolution = resolver.resolve(&event);
        assert_eq!(resolution.cache_keys_to_purge.len(), 1);
    }

    #[test]
    fn pattern_treats_question_mark_as_literal() {
        let matcher = UrlPattern::new("/blog/*");
        assert!(matcher.matches("/blog/1"));
        assert!(matcher.matches("/blog/"));
        assert!(!matcher.matches("/about"));

        let literal = UrlPattern::new("/a?b");
        assert!(literal.matches("/a?b"));
        assert!(!literal.matches("/axb"));
    }
}
