//! Request orchestration: classify, consult the cache, fan out, merge.
//!
//! Every upstream call on every path runs through that provider's retry
//! policy and circuit breaker. Title and mixed queries fan out to all
//! search providers concurrently with all-settled semantics, so one slow
//! upstream never blocks the rest. Cache failures are never fatal; the
//! orchestrator falls back to the direct provider path and skips caching
//! for that request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};

use crate::aggregate::{rank_editions, AggregationContext, ResultAggregator};
use crate::cache::{build_key, object_key, TieredCache};
use crate::models::{
    normalize_isbn, AggregatedResponse, ProviderResult, QueryKind, SearchRequest, Work,
};
use crate::providers::{Provider, ProviderCapabilities, ProviderError, ProviderRegistry};
use crate::resilience::RetryPolicy;

/// Bound on concurrent edition-enrichment calls per author request
const ENRICHMENT_CONCURRENCY: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    /// Malformed or missing query; surfaced immediately, never retried,
    /// never cached
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Zero upstreams returned usable data
    #[error("No provider returned usable data: {detail}")]
    AggregationEmpty { detail: String },

    /// Hard failure on a single-provider path
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// TTLs per response family. Identifier lookups are the most stable,
/// bibliographies drift slowly, general search is volatile.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub search: Duration,
    pub author: Duration,
    pub isbn: Duration,
    /// TTL for successful-but-empty responses; short, so a transient
    /// upstream gap clears on its own
    pub empty: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(60 * 60),
            author: Duration::from_secs(24 * 60 * 60),
            isbn: Duration::from_secs(7 * 24 * 60 * 60),
            empty: Duration::from_secs(60),
        }
    }
}

pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    cache: TieredCache,
    policies: HashMap<String, RetryPolicy>,
    ttls: CacheTtls,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, cache: TieredCache) -> Self {
        Self {
            registry,
            cache,
            policies: HashMap::new(),
            ttls: CacheTtls::default(),
        }
    }

    /// Attach the retry policy (and with it the breaker) for one provider
    pub fn with_policy(mut self, provider_id: impl Into<String>, policy: RetryPolicy) -> Self {
        self.policies.insert(provider_id.into(), policy);
        self
    }

    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Handle one request end to end
    pub async fn handle(
        &self,
        request: &SearchRequest,
    ) -> Result<AggregatedResponse, OrchestrateError> {
        let started = Instant::now();

        if request.query.trim().is_empty() {
            return Err(OrchestrateError::Validation("empty query".to_string()));
        }

        let kind = request.kind();
        let key = self.cache_key(kind, request);
        tracing::debug!(query = %request.query, kind = kind.as_str(), key = %key, "handling request");

        if let Some(hit) = self.cache.get::<AggregatedResponse>(&key).await {
            let elapsed = started.elapsed().as_millis() as u64;
            return Ok(hit.entry.payload.cached(true).response_time_ms(elapsed));
        }

        let (mut response, ttl, durable) = match kind {
            QueryKind::Isbn => {
                let response = self.handle_isbn(request).await?;
                (response, self.ttls.isbn, true)
            }
            QueryKind::Author => {
                let response = self.handle_author(request).await?;
                (response, self.ttls.author, true)
            }
            QueryKind::Title | QueryKind::Mixed => {
                let response = self.handle_search(request).await?;
                (response, self.ttls.search, false)
            }
        };

        // Editions arrive ranked best-first; default requests carry only
        // the representative edition per work
        if !request.params.show_all_editions {
            for work in &mut response.items {
                work.editions.truncate(1);
            }
        }

        // Empty successes are cached too, just briefly, so repeat misses
        // don't hammer the upstreams
        let (ttl, durable) = if response.items.is_empty() {
            (self.ttls.empty, false)
        } else {
            (ttl, durable)
        };
        if let Err(e) = self
            .cache
            .put(&key, &response, ttl, durable, &response.provider, false)
            .await
        {
            tracing::warn!(key = %key, error = %e, "skipping cache write for this request");
        }

        // Identifier lookups additionally land as durable objects under
        // the entity/id layout, addressable without the request params
        if kind == QueryKind::Isbn && !response.items.is_empty() {
            let object = object_key("book", &normalize_isbn(&request.query));
            if let Err(e) = self
                .cache
                .put_durable(&object, &response, self.ttls.isbn, &response.provider)
                .await
            {
                tracing::warn!(key = %object, error = %e, "durable object write failed");
            }
        }

        let elapsed = started.elapsed().as_millis() as u64;
        Ok(response.response_time_ms(elapsed))
    }

    pub(crate) fn cache_key(&self, kind: QueryKind, request: &SearchRequest) -> String {
        match kind {
            QueryKind::Isbn => build_key(
                "book",
                kind,
                &normalize_isbn(&request.query),
                &request.params,
            ),
            QueryKind::Author => build_key("author_works", kind, &request.query, &request.params),
            QueryKind::Title | QueryKind::Mixed => {
                build_key("search", kind, &request.query, &request.params)
            }
        }
    }

    fn policy(&self, provider_id: &str) -> Result<&RetryPolicy, ProviderError> {
        self.policies.get(provider_id).ok_or_else(|| {
            ProviderError::Other(format!("no retry policy configured for '{provider_id}'"))
        })
    }

    fn capability_provider(
        &self,
        capability: ProviderCapabilities,
        what: &str,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        self.registry
            .with_capability(capability)
            .first()
            .map(|p| Arc::clone(p))
            .ok_or_else(|| ProviderError::Other(format!("no provider supports {what}")))
    }

    /// Direct identifier lookup against the identifier-database upstream
    async fn handle_isbn(
        &self,
        request: &SearchRequest,
    ) -> Result<AggregatedResponse, OrchestrateError> {
        let isbn = normalize_isbn(&request.query);
        let provider = self.capability_provider(ProviderCapabilities::ISBN_LOOKUP, "isbn lookup")?;
        let policy = self.policy(provider.id())?;

        let outcome = policy
            .execute(&isbn, |q| {
                let provider = Arc::clone(&provider);
                async move { provider.get_by_isbn(&q).await }
            })
            .await;

        let works = match outcome {
            Ok(work) => vec![work],
            // A clean miss is an empty response, not a failure
            Err(ProviderError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let results = [ProviderResult::ok(provider.id(), works)];
        let items = ResultAggregator::new(AggregationContext::SameShape)
            .with_requested_isbn(isbn)
            .aggregate(&results);

        Ok(AggregatedResponse::from_items(
            items,
            &[provider.id().to_string()],
        ))
    }

    /// Bibliography from the catalog upstream, editions merged in from
    /// the identifier database under bounded concurrency
    async fn handle_author(
        &self,
        request: &SearchRequest,
    ) -> Result<AggregatedResponse, OrchestrateError> {
        let provider =
            self.capability_provider(ProviderCapabilities::AUTHOR_WORKS, "author bibliographies")?;
        let policy = self.policy(provider.id())?;

        let outcome = policy
            .execute(&request.query, |q| {
                let provider = Arc::clone(&provider);
                async move { provider.get_author_works(&q).await }
            })
            .await;

        let works = match outcome {
            Ok(works) => works,
            Err(ProviderError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let results = [ProviderResult::ok(provider.id(), works)];
        let items =
            ResultAggregator::new(AggregationContext::SameShape).aggregate(&results);
        let items = self.enrich_editions(items).await;

        Ok(AggregatedResponse::from_items(
            items,
            &[provider.id().to_string()],
        ))
    }

    /// Merge editions from the editions-capable upstream onto each work.
    ///
    /// Enrichment is best-effort: any failure leaves the work as-is.
    async fn enrich_editions(&self, items: Vec<Work>) -> Vec<Work> {
        let Ok(provider) = self.capability_provider(ProviderCapabilities::EDITIONS, "editions")
        else {
            return items;
        };
        let Ok(policy) = self.policy(provider.id()) else {
            return items;
        };

        stream::iter(items)
            .map(|mut work| {
                let provider = Arc::clone(&provider);
                async move {
                    let author = work.author_line();
                    let outcome = policy
                        .execute(&work.title, |title| {
                            let provider = Arc::clone(&provider);
                            let author = author.clone();
                            async move { provider.get_editions_for_work(&title, &author).await }
                        })
                        .await;

                    match outcome {
                        Ok(editions) => {
                            let known: Vec<String> = work
                                .editions
                                .iter()
                                .filter_map(|e| e.primary_isbn().map(str::to_string))
                                .collect();
                            for edition in editions {
                                let novel = edition
                                    .primary_isbn()
                                    .map(|isbn| !known.iter().any(|k| k == isbn))
                                    .unwrap_or(true);
                                if novel {
                                    work.editions.push(edition);
                                }
                            }
                            // Re-rank so merged-in editions compete with
                            // the originals
                            rank_editions(&mut work, None);
                        }
                        Err(e) => {
                            tracing::debug!(
                                provider = provider.id(),
                                title = %work.title,
                                error = %e,
                                "edition enrichment skipped"
                            );
                        }
                    }
                    work
                }
            })
            .buffer_unordered(ENRICHMENT_CONCURRENCY)
            .collect()
            .await
    }

    /// Concurrent all-settled fan-out across every search-capable
    /// upstream; only fulfilled results are aggregated
    async fn handle_search(
        &self,
        request: &SearchRequest,
    ) -> Result<AggregatedResponse, OrchestrateError> {
        let providers = self.registry.searchable();
        if providers.is_empty() {
            return Err(OrchestrateError::AggregationEmpty {
                detail: "no search providers registered".to_string(),
            });
        }

        let calls = providers.into_iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let id = provider.id().to_string();
                let policy = match self.policy(&id) {
                    Ok(policy) => policy,
                    Err(e) => return ProviderResult::failed(id, e.to_string()),
                };

                let outcome = policy
                    .execute(&request.query, |q| {
                        let provider = Arc::clone(&provider);
                        let mut escalated = request.clone();
                        escalated.query = q;
                        async move { provider.search(&escalated).await }
                    })
                    .await;

                match outcome {
                    Ok(works) => ProviderResult::ok(id, works),
                    Err(ProviderError::NotFound(_)) => ProviderResult::ok(id, Vec::new()),
                    Err(e) => {
                        tracing::warn!(provider = %id, error = %e, "search upstream failed");
                        ProviderResult::failed(id, e.to_string())
                    }
                }
            }
        });

        let results = join_all(calls).await;

        if results.iter().all(|r| !r.success) {
            let detail = results
                .iter()
                .filter_map(|r| {
                    r.error
                        .as_ref()
                        .map(|e| format!("{}: {}", r.provider, e))
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(OrchestrateError::AggregationEmpty { detail });
        }

        let items =
            ResultAggregator::new(AggregationContext::CrossProvider).aggregate(&results);

        let mut contributors: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.provider.clone())
            .collect();
        contributors.sort_by_key(|id| crate::aggregate::priority_rank(id));

        Ok(AggregatedResponse::from_items(items, &contributors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditionBuilder, ProviderKind, WorkBuilder};
    use crate::providers::MockProvider;
    use crate::resilience::{BreakerConfig, CircuitBreaker, RetryConfig};
    use crate::store::{MemoryStore, StateStore};

    fn fast_policy(provider: &str) -> RetryPolicy {
        let breaker = CircuitBreaker::new(
            provider,
            BreakerConfig::default(),
            Arc::new(MemoryStore::new()),
        );
        RetryPolicy::new(
            RetryConfig {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                max_jitter: Duration::ZERO,
                call_timeout: Duration::from_secs(2),
            },
            Vec::new(),
            breaker,
        )
    }

    fn orchestrator_with(providers: Vec<Arc<MockProvider>>) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        let mut orchestrator_ids = Vec::new();
        for p in &providers {
            orchestrator_ids.push(p.id().to_string());
            registry.register(Arc::clone(p) as Arc<dyn Provider>);
        }

        let cache = TieredCache::new(
            Arc::new(MemoryStore::new()) as Arc<dyn StateStore>,
            Arc::new(MemoryStore::new()) as Arc<dyn StateStore>,
        );

        let mut orchestrator = Orchestrator::new(Arc::new(registry), cache);
        for id in orchestrator_ids {
            let policy = fast_policy(&id);
            orchestrator = orchestrator.with_policy(id, policy);
        }
        orchestrator
    }

    fn titled(provider: ProviderKind, title: &str) -> Work {
        WorkBuilder::new(title, title, provider).author("Someone").build()
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let orchestrator = orchestrator_with(vec![]);
        let err = orchestrator
            .handle(&SearchRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::Validation(_)));
    }

    #[tokio::test]
    async fn test_isbn_path_uses_lookup_provider() {
        let mock = Arc::new(
            MockProvider::new("isbndb")
                .capabilities(ProviderCapabilities::ISBN_LOOKUP)
                .with_isbn_work(
                    WorkBuilder::new("9780553418026", "The Martian", ProviderKind::Isbndb)
                        .edition(EditionBuilder::new().isbn13("9780553418026").build())
                        .build(),
                ),
        );
        let orchestrator = orchestrator_with(vec![Arc::clone(&mock)]);

        let response = orchestrator
            .handle(&SearchRequest::new("978-0-553-41802-6"))
            .await
            .unwrap();

        assert_eq!(response.total_items, 1);
        assert_eq!(response.provider, "orchestrated:isbndb");
        assert_eq!(mock.isbn_calls(), 1);
        assert_eq!(mock.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_isbn_miss_is_empty_not_error() {
        let mock = Arc::new(
            MockProvider::new("isbndb").capabilities(ProviderCapabilities::ISBN_LOOKUP),
        );
        let orchestrator = orchestrator_with(vec![mock]);

        let response = orchestrator
            .handle(&SearchRequest::new("9780000000000"))
            .await
            .unwrap();
        assert_eq!(response.total_items, 0);
    }

    #[tokio::test]
    async fn test_author_path_enriches_editions() {
        let catalog = Arc::new(
            MockProvider::new("openlibrary")
                .capabilities(ProviderCapabilities::AUTHOR_WORKS)
                .with_author_works(vec![titled(ProviderKind::OpenLibrary, "The Martian")]),
        );
        let editions = Arc::new(
            MockProvider::new("isbndb")
                .capabilities(ProviderCapabilities::EDITIONS)
                .with_editions(vec![
                    EditionBuilder::new().isbn13("9780553418026").build(),
                ]),
        );
        let orchestrator = orchestrator_with(vec![Arc::clone(&catalog), Arc::clone(&editions)]);

        let response = orchestrator
            .handle(&SearchRequest::new("Andy Weir"))
            .await
            .unwrap();

        assert_eq!(response.total_items, 1);
        assert_eq!(response.items[0].editions.len(), 1);
        assert_eq!(catalog.author_calls(), 1);
        assert_eq!(editions.edition_calls(), 1);
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_work() {
        let catalog = Arc::new(
            MockProvider::new("openlibrary")
                .capabilities(ProviderCapabilities::AUTHOR_WORKS)
                .with_author_works(vec![titled(ProviderKind::OpenLibrary, "The Martian")]),
        );
        let editions = Arc::new(
            MockProvider::new("isbndb")
                .capabilities(ProviderCapabilities::EDITIONS)
                .always_failing(|| ProviderError::Timeout),
        );
        let orchestrator = orchestrator_with(vec![catalog, editions]);

        let response = orchestrator
            .handle(&SearchRequest::new("Andy Weir"))
            .await
            .unwrap();
        assert_eq!(response.total_items, 1);
        assert!(response.items[0].editions.is_empty());
    }

    #[tokio::test]
    async fn test_best_edition_only_unless_all_requested() {
        let two_editions = WorkBuilder::new("g1", "The Martian", ProviderKind::Google)
            .author("Andy Weir")
            .edition(
                EditionBuilder::new()
                    .isbn13("9780000000001")
                    .binding(crate::models::Binding::Paperback)
                    .build(),
            )
            .edition(
                EditionBuilder::new()
                    .isbn13("9780000000002")
                    .binding(crate::models::Binding::Hardcover)
                    .build(),
            )
            .build();
        let mock = Arc::new(
            MockProvider::new("google")
                .capabilities(ProviderCapabilities::SEARCH)
                .with_search_results(vec![two_editions]),
        );
        let orchestrator = orchestrator_with(vec![mock]);

        let trimmed = orchestrator
            .handle(&SearchRequest::new("The Martian"))
            .await
            .unwrap();
        assert_eq!(trimmed.items[0].editions.len(), 1);
        // The ranked best edition survives the trim
        assert_eq!(
            trimmed.items[0].editions[0].isbn13.as_deref(),
            Some("9780000000002")
        );

        let full = orchestrator
            .handle(&SearchRequest::new("The Martian").show_all_editions(true))
            .await
            .unwrap();
        assert_eq!(full.items[0].editions.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_result_cached_briefly() {
        let mock = Arc::new(
            MockProvider::new("isbndb").capabilities(ProviderCapabilities::ISBN_LOOKUP),
        );
        let orchestrator = orchestrator_with(vec![Arc::clone(&mock)]);

        let request = SearchRequest::new("9780000000000");
        let first = orchestrator.handle(&request).await.unwrap();
        assert_eq!(first.total_items, 0);
        assert!(!first.cached);

        // The empty success is served from cache, not re-fetched
        let second = orchestrator.handle(&request).await.unwrap();
        assert!(second.cached);
        assert_eq!(mock.isbn_calls(), 1);
    }

    #[tokio::test]
    async fn test_search_all_failed_is_aggregation_empty() {
        let a = Arc::new(
            MockProvider::new("google")
                .capabilities(ProviderCapabilities::SEARCH)
                .always_failing(|| ProviderError::Timeout),
        );
        let b = Arc::new(
            MockProvider::new("openlibrary")
                .capabilities(ProviderCapabilities::SEARCH)
                .always_failing(|| ProviderError::ServerError("503".into())),
        );
        let orchestrator = orchestrator_with(vec![a, b]);

        let err = orchestrator
            .handle(&SearchRequest::new("The Fellowship of the Ring"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::AggregationEmpty { .. }));
    }

    #[tokio::test]
    async fn test_provider_tag_ordered_by_priority() {
        let ol = Arc::new(
            MockProvider::new("openlibrary")
                .capabilities(ProviderCapabilities::SEARCH)
                .with_search_results(vec![titled(ProviderKind::OpenLibrary, "Dune")]),
        );
        let google = Arc::new(
            MockProvider::new("google")
                .capabilities(ProviderCapabilities::SEARCH)
                .with_search_results(vec![titled(ProviderKind::Google, "Dune Messiah")]),
        );
        let orchestrator = orchestrator_with(vec![ol, google]);

        let response = orchestrator
            .handle(&SearchRequest::new("The Dune Chronicles"))
            .await
            .unwrap();
        assert_eq!(response.provider, "orchestrated:google+openlibrary");
    }
}
